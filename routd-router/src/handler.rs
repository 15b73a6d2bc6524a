//! Controller and middleware hook traits.
//!
//! Both traits have blanket impls for plain closures so synchronous
//! handlers need no boilerplate; async handlers wrap a boxed-future
//! closure in [`AsyncController`] / [`AsyncHook`].

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use routd_x::Error;

use crate::context::Context;
use crate::protocol::RoutableProtocol;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A route's request handler.
#[async_trait]
pub trait Controller<Rp: RoutableProtocol>: Send + Sync {
    async fn handle(&self, ctx: &mut Context<Rp>);
}

#[async_trait]
impl<Rp, F> Controller<Rp> for F
where
    Rp: RoutableProtocol,
    F: Fn(&mut Context<Rp>) + Send + Sync,
{
    async fn handle(&self, ctx: &mut Context<Rp>) {
        self(ctx);
    }
}

/// Adapter for asynchronous controllers:
///
/// ```ignore
/// router.push_api(api, AsyncController(|ctx| Box::pin(async move {
///     let body = ctx.body();
///     // ...
/// })));
/// ```
pub struct AsyncController<F>(pub F);

#[async_trait]
impl<Rp, F> Controller<Rp> for AsyncController<F>
where
    Rp: RoutableProtocol,
    F: for<'a> Fn(&'a mut Context<Rp>) -> BoxFuture<'a, ()> + Send + Sync,
{
    async fn handle(&self, ctx: &mut Context<Rp>) {
        (self.0)(ctx).await;
    }
}

/// A before/after middleware hook. Returning an error from a before hook
/// short-circuits the controller and after hook.
#[async_trait]
pub trait Hook<Rp: RoutableProtocol>: Send + Sync {
    async fn call(&self, ctx: &mut Context<Rp>) -> Result<(), Error>;
}

#[async_trait]
impl<Rp, F> Hook<Rp> for F
where
    Rp: RoutableProtocol,
    F: Fn(&mut Context<Rp>) -> Result<(), Error> + Send + Sync,
{
    async fn call(&self, ctx: &mut Context<Rp>) -> Result<(), Error> {
        self(ctx)
    }
}

/// Adapter for asynchronous hooks, mirroring [`AsyncController`].
pub struct AsyncHook<F>(pub F);

#[async_trait]
impl<Rp, F> Hook<Rp> for AsyncHook<F>
where
    Rp: RoutableProtocol,
    F: for<'a> Fn(&'a mut Context<Rp>) -> BoxFuture<'a, Result<(), Error>> + Send + Sync,
{
    async fn call(&self, ctx: &mut Context<Rp>) -> Result<(), Error> {
        (self.0)(ctx).await
    }
}
