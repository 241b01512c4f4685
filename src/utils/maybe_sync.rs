use core::{future::Future, pin::Pin};

use futures::stream::Stream;

pub type BoxFuture<'a, T> = Pin<alloc::boxed::Box<dyn Future<Output = T> + Send + 'a>>;

pub type BoxStream<'a, T> = Pin<alloc::boxed::Box<dyn Stream<Item = T> + Send + 'a>>;

pub fn box_future<'a, T>(fut: impl Future<Output = T> + Send + 'a) -> BoxFuture<'a, T> {
    Box::pin(fut)
}

/// Boxes a future as a `BoxFuture`, so closures can return it where a
/// `dyn Fn(..) -> BoxFuture<..>` is expected.
#[macro_export]
macro_rules! boxed {
    ($e:expr) => {
        $crate::utils::box_future($e)
    };
}
