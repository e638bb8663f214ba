//! Per-request descriptor rewriting, applied just before dispatch.

use base64::Engine;

use crate::descriptor::RequestDescriptor;

/// Rewrites an outgoing descriptor before dispatch. Adapters are attached to
/// a single request and run in registration order, after the client's default
/// headers are merged and before the request middleware chain.
pub trait RequestAdapter: Send + Sync {
    /// Rewrite the descriptor.
    fn adapt(&self, descriptor: RequestDescriptor) -> RequestDescriptor;
}

impl<F> RequestAdapter for F
where
    F: Fn(RequestDescriptor) -> RequestDescriptor + Send + Sync,
{
    fn adapt(&self, descriptor: RequestDescriptor) -> RequestDescriptor {
        self(descriptor)
    }
}

/// Sets a static header on every dispatch of the request.
pub struct HeaderAdapter {
    name: String,
    value: String,
}

impl HeaderAdapter {
    /// Create a header adapter.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl RequestAdapter for HeaderAdapter {
    fn adapt(&self, descriptor: RequestDescriptor) -> RequestDescriptor {
        descriptor.with_header(&self.name, &self.value)
    }
}

/// Adds a bearer token `authorization` header.
pub struct BearerAuthAdapter {
    token: String,
}

impl BearerAuthAdapter {
    /// Create a bearer auth adapter.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl RequestAdapter for BearerAuthAdapter {
    fn adapt(&self, descriptor: RequestDescriptor) -> RequestDescriptor {
        descriptor.with_header("authorization", format!("Bearer {}", self.token))
    }
}

/// Adds a basic auth `authorization` header.
pub struct BasicAuthAdapter {
    username: String,
    password: String,
}

impl BasicAuthAdapter {
    /// Create a basic auth adapter.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl RequestAdapter for BasicAuthAdapter {
    fn adapt(&self, descriptor: RequestDescriptor) -> RequestDescriptor {
        let credentials = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.username, self.password));
        descriptor.with_header("authorization", format!("Basic {credentials}"))
    }
}

/// Adds an API key under a custom header.
pub struct ApiKeyAdapter {
    header: String,
    key: String,
}

impl ApiKeyAdapter {
    /// Create an API key adapter.
    pub fn new(header: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            key: key.into(),
        }
    }
}

impl RequestAdapter for ApiKeyAdapter {
    fn adapt(&self, descriptor: RequestDescriptor) -> RequestDescriptor {
        descriptor.with_header(&self.header, &self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn descriptor() -> RequestDescriptor {
        RequestDescriptor::builder(Method::GET, "https://example.com/")
            .build()
            .unwrap()
    }

    #[test]
    fn bearer_auth_sets_header() {
        let adapted = BearerAuthAdapter::new("sekrit").adapt(descriptor());
        assert_eq!(
            adapted.headers().get("authorization").unwrap(),
            "Bearer sekrit"
        );
    }

    #[test]
    fn basic_auth_encodes_credentials() {
        let adapted = BasicAuthAdapter::new("user", "pass").adapt(descriptor());
        assert_eq!(
            adapted.headers().get("authorization").unwrap(),
            "Basic dXNlcjpwYXNz"
        );
    }

    #[test]
    fn closure_adapters_compose() {
        let adapted = (|d: RequestDescriptor| d.with_header("x-trace", "on")).adapt(descriptor());
        assert_eq!(adapted.headers().get("x-trace").unwrap(), "on");
    }
}
