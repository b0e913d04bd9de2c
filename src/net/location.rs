//! Document location and same-origin checks.
use url::Url;

use crate::errors::NetError;

/// Scheme and host of the document the pipeline works on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentOrigin {
    pub scheme: String,
    pub host: String,
}

impl DocumentOrigin {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into().to_ascii_lowercase(),
            host: host.into().to_ascii_lowercase(),
        }
    }

    /// Base URL used to resolve relative request URLs.
    fn base(&self) -> Result<Url, url::ParseError> {
        Url::parse(&format!("{}://{}/", self.scheme, self.host))
    }

    /// Resolves a possibly relative `target` to an absolute URL.
    pub fn resolve(&self, target: &str) -> Option<Url> {
        self.base().ok()?.join(target).ok()
    }

    /// Resolves `target` against this origin and compares scheme and host.
    ///
    /// Ports are not compared. Targets that cannot be resolved are never
    /// same-origin.
    pub fn is_same_origin(&self, target: &str) -> bool {
        let Ok(base) = self.base() else {
            return false;
        };
        let Ok(resolved) = base.join(target) else {
            return false;
        };

        resolved.scheme() == base.scheme() && resolved.host_str() == base.host_str()
    }
}

/// Gives access to the current document origin.
pub trait LocationResolver: Send + Sync {
    fn current_origin(&self) -> DocumentOrigin;
}

/// A location that never changes.
#[derive(Debug, Clone)]
pub struct FixedLocation {
    origin: DocumentOrigin,
}

impl FixedLocation {
    pub fn new(origin: DocumentOrigin) -> Self {
        Self { origin }
    }

    /// Takes scheme and host from a document URL.
    pub fn from_url(document: &str) -> Result<Self, NetError> {
        let url = Url::parse(document)
            .map_err(|e| NetError::InvalidArgument(format!("invalid document URL {document}: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| NetError::InvalidArgument(format!("document URL {document} has no host")))?;
        Ok(Self::new(DocumentOrigin::new(url.scheme(), host)))
    }
}

impl LocationResolver for FixedLocation {
    fn current_origin(&self) -> DocumentOrigin {
        self.origin.clone()
    }
}
