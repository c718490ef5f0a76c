// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Route table: exact path -> allowed methods -> handler.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::message::Method;
use crate::request::Request;
use crate::response::HandlerResult;

pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send + 'static>>;

/// Request handler.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, req: Request) -> HandlerFuture;
}

/// Any `Fn(Request) -> impl Future<Output = HandlerResult>` is a handler.
impl<F, Fut> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, req: Request) -> HandlerFuture {
        Box::pin(self(req))
    }
}

struct Route {
    path: String,
    methods: Vec<Method>,
    handler: Arc<dyn Handler>,
}

/// Outcome of a lookup.
pub enum RouteMatch {
    Found(Arc<dyn Handler>),
    NotFound,
    MethodNotAllowed,
}

/// Routes registered at startup.
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`RouteTable::add`].
    pub fn route<H: Handler>(mut self, path: &str, methods: &[Method], handler: H) -> Self {
        self.add(path, methods, handler);
        self
    }

    /// Bind `path` to `handler`. A second registration of the same path
    /// replaces the first.
    pub fn add<H: Handler>(&mut self, path: &str, methods: &[Method], handler: H) {
        let route = Route {
            path: path.to_string(),
            methods: methods.to_vec(),
            handler: Arc::new(handler),
        };
        match self.routes.iter_mut().find(|r| r.path == path) {
            Some(existing) => *existing = route,
            None => self.routes.push(route),
        }
    }

    pub fn lookup(&self, path: &str, method: Method) -> RouteMatch {
        match self.routes.iter().find(|r| r.path == path) {
            None => RouteMatch::NotFound,
            Some(r) if !r.methods.contains(&method) => RouteMatch::MethodNotAllowed,
            Some(r) => RouteMatch::Found(r.handler.clone()),
        }
    }

    /// Registered paths in registration order.
    pub fn paths(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.path.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.routes.iter().map(|r| (&r.path, &r.methods)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Code;
    use crate::response::Reply;

    async fn ok(_req: Request) -> HandlerResult {
        Ok(Reply::Status(Code::CONTENT))
    }

    #[test]
    fn test_lookup_outcomes() {
        let table = RouteTable::new().route("/app/ping", &[Method::Get], ok);
        assert!(matches!(table.lookup("/app/ping", Method::Get), RouteMatch::Found(_)));
        assert!(matches!(
            table.lookup("/app/ping", Method::Post),
            RouteMatch::MethodNotAllowed
        ));
        assert!(matches!(table.lookup("/app/pong", Method::Get), RouteMatch::NotFound));
    }

    #[test]
    fn test_reregister_replaces() {
        let table = RouteTable::new()
            .route("/x", &[Method::Get], ok)
            .route("/x", &[Method::Post], ok);
        assert_eq!(table.len(), 1);
        assert!(matches!(table.lookup("/x", Method::Get), RouteMatch::MethodNotAllowed));
        assert!(matches!(table.lookup("/x", Method::Post), RouteMatch::Found(_)));
    }

    #[test]
    fn test_paths_in_order() {
        let table = RouteTable::new()
            .route("/b", &[Method::Get], ok)
            .route("/a", &[Method::Get], ok);
        assert_eq!(table.paths(), vec!["/b", "/a"]);
    }
}
