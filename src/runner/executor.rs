use super::context::RunContext;
use crate::driver::traits::{Response, Transport, TransportRequest};
use crate::parser::types::{parse_method, AuthMode, TestCase};
use std::sync::Arc;

/// Normalizes one test case into a transport call.
///
/// Targets are resolved against the API base, `${var}` references are
/// substituted and the session's bearer token is attached unless the case
/// opted out or set its own `Authorization` header. Never fails on the
/// network: transport problems come back as a sentinel [`Response`].
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    ctx: Arc<RunContext>,
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn Transport>, ctx: Arc<RunContext>) -> Self {
        Self { transport, ctx }
    }

    pub fn context(&self) -> &Arc<RunContext> {
        &self.ctx
    }

    /// Absolute targets are used as-is, anything else is joined to the API base
    pub fn resolve_url(&self, target: &str) -> String {
        join_url(self.ctx.config().api_base_url(), target)
    }

    /// Build the transport request for `case`, or explain why it cannot be sent
    pub fn build(&self, case: &TestCase) -> Result<TransportRequest, String> {
        let method = parse_method(&case.method)
            .ok_or_else(|| format!("invalid HTTP method '{}'", case.method))?;

        let url = self.resolve_url(&self.ctx.substitute(&case.path));
        let mut request = TransportRequest::new(method, &url);

        for (k, v) in &case.headers {
            request.headers.push((k.clone(), self.ctx.substitute(v)));
        }
        for (k, v) in &case.query {
            request.query.push((k.clone(), self.ctx.substitute(v)));
        }
        request.body = case.body.as_ref().map(|b| self.ctx.substitute_value(b));

        if request.header("authorization").is_none() {
            let token = match case.auth {
                AuthMode::Inherit => self.ctx.auth_token(),
                AuthMode::Admin => self.ctx.admin_token(),
                AuthMode::Anonymous => None,
            };
            if let Some(token) = token {
                request
                    .headers
                    .push(("Authorization".to_string(), format!("Bearer {}", token)));
            }
        }

        Ok(request)
    }

    pub async fn send(&self, request: TransportRequest) -> Response {
        log::debug!("{} {}", request.method, request.url);
        self.transport.request(request).await
    }

    /// Build and send in one go
    pub async fn execute(&self, case: &TestCase) -> Result<Response, String> {
        let request = self.build(case)?;
        Ok(self.send(request).await)
    }
}

/// Join a target onto a base URL unless the target is already absolute
pub fn join_url(base: &str, target: &str) -> String {
    if target.starts_with("http://")
        || target.starts_with("https://")
        || target.starts_with("ws://")
        || target.starts_with("wss://")
    {
        return target.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        target.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::{test_context, MockTransport};
    use serde_json::json;

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("http://localhost:5000/", "/api/health"),
            "http://localhost:5000/api/health"
        );
        assert_eq!(
            join_url("http://localhost:5000", "api/health"),
            "http://localhost:5000/api/health"
        );
        assert_eq!(
            join_url("http://localhost:5000", "https://other/x"),
            "https://other/x"
        );
    }

    #[test]
    fn test_build_attaches_session_token() {
        let ctx = test_context();
        ctx.set_auth_token(Some("user-token".to_string()));
        ctx.set_admin_token(Some("admin-token".to_string()));
        let executor = RequestExecutor::new(Arc::new(MockTransport::new()), ctx);

        let req = executor.build(&TestCase::get("a", "/x")).unwrap();
        assert_eq!(req.header("authorization"), Some("Bearer user-token"));

        let req = executor
            .build(&TestCase::get("a", "/x").with_auth(AuthMode::Admin))
            .unwrap();
        assert_eq!(req.header("authorization"), Some("Bearer admin-token"));

        let req = executor
            .build(&TestCase::get("a", "/x").with_auth(AuthMode::Anonymous))
            .unwrap();
        assert!(req.header("authorization").is_none());
    }

    #[test]
    fn test_explicit_authorization_header_wins() {
        let ctx = test_context();
        ctx.set_auth_token(Some("user-token".to_string()));
        let executor = RequestExecutor::new(Arc::new(MockTransport::new()), ctx);

        let case = TestCase::get("a", "/x").with_header("Authorization", "Bearer other");
        let req = executor.build(&case).unwrap();
        assert_eq!(req.header("authorization"), Some("Bearer other"));
        assert_eq!(req.headers.len(), 1);
    }

    #[test]
    fn test_build_substitutes_path_query_and_body() {
        let ctx = test_context();
        ctx.set_var("product_id", "p-7");
        let executor = RequestExecutor::new(Arc::new(MockTransport::new()), ctx);

        let case = TestCase::new("a", "put", "/api/v1/products/${product_id}")
            .with_query("ref", "${product_id}")
            .with_body(json!({ "product": "${product_id}" }));
        let req = executor.build(&case).unwrap();

        assert_eq!(req.method, reqwest::Method::PUT);
        assert_eq!(req.url, "http://mock.local/api/v1/products/p-7");
        assert_eq!(req.query, vec![("ref".to_string(), "p-7".to_string())]);
        assert_eq!(req.body, Some(json!({ "product": "p-7" })));
    }

    #[test]
    fn test_invalid_method_is_reported() {
        let executor = RequestExecutor::new(Arc::new(MockTransport::new()), test_context());
        let err = executor
            .build(&TestCase::new("a", "FETCH", "/x"))
            .unwrap_err();
        assert!(err.contains("FETCH"));
    }

    #[tokio::test]
    async fn test_unrouted_call_returns_sentinel() {
        let executor = RequestExecutor::new(Arc::new(MockTransport::new()), test_context());
        let res = executor.execute(&TestCase::get("a", "/x")).await.unwrap();
        assert!(!res.reached());
    }
}
