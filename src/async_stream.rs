//! Produce a `Stream` from an async block.
//!
//! The async closure gets a [`Sender`] and yields items with
//! `tx.send(item).await`; the channel has no buffer, so the producer runs
//! in lock-step with the consumer and memory usage stays bounded by one
//! item. An error returned from the closure ends the stream with that
//! error as the final item.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_channel::mpsc;
use futures_util::Stream;

/// Handed to the async closure; sends items into the stream.
pub struct Sender<I>(mpsc::Sender<I>);

/// Future returned by [`Sender::send`]. Completes when the consumer
/// has picked the previous item up and this one is parked.
#[must_use]
pub struct SendFuture<'a, I> {
    tx: &'a mut mpsc::Sender<I>,
    item: Option<I>,
}

impl<I> Sender<I> {
    /// Send one item to the stream.
    pub fn send<T>(&mut self, item: T) -> SendFuture<'_, I>
    where
        T: Into<I>,
    {
        SendFuture {
            tx: &mut self.0,
            item: Some(item.into()),
        }
    }
}

impl<I: Unpin> Future for SendFuture<'_, I> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match this.tx.poll_ready(cx) {
            Poll::Ready(Ok(())) => {
                if let Some(item) = this.item.take() {
                    // the only error here is "receiver dropped", in which
                    // case the item just goes nowhere.
                    let _ = this.tx.start_send(item);
                }
                Poll::Ready(())
            }
            Poll::Ready(Err(_)) => Poll::Ready(()),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// A stream produced by an async closure.
#[must_use]
pub struct AsyncStream<I, E> {
    rx: mpsc::Receiver<I>,
    fut: Option<Pin<Box<dyn Future<Output = Result<(), E>> + Send + 'static>>>,
    // an error the producer returned while an item was still parked;
    // delivered right after that item.
    err: Option<E>,
}

impl<I: 'static, E: 'static> AsyncStream<I, E> {
    /// Create a new stream. The closure is passed a [`Sender`] and is
    /// driven by the stream's own `poll_next`.
    pub fn new<F, R>(f: F) -> Self
    where
        F: FnOnce(Sender<I>) -> R,
        R: Future<Output = Result<(), E>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(0);
        AsyncStream {
            rx,
            fut: Some(Box::pin(f(Sender(tx)))),
            err: None,
        }
    }
}

impl<I, E: Unpin> Stream for AsyncStream<I, E> {
    type Item = Result<I, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // deliver anything the producer parked in the channel first.
        if let Poll::Ready(Some(item)) = Pin::new(&mut self.rx).poll_next(cx) {
            return Poll::Ready(Some(Ok(item)));
        }
        if let Some(e) = self.err.take() {
            return Poll::Ready(Some(Err(e)));
        }

        match self.fut.as_mut() {
            Some(fut) => match fut.as_mut().poll(cx) {
                Poll::Ready(Ok(())) => {
                    // producer finished; drain what's left.
                    self.fut = None;
                    match Pin::new(&mut self.rx).poll_next(cx) {
                        Poll::Ready(Some(item)) => Poll::Ready(Some(Ok(item))),
                        _ => Poll::Ready(None),
                    }
                }
                Poll::Ready(Err(e)) => {
                    // a parked item still goes out before the error.
                    self.fut = None;
                    match Pin::new(&mut self.rx).poll_next(cx) {
                        Poll::Ready(Some(item)) => {
                            self.err = Some(e);
                            Poll::Ready(Some(Ok(item)))
                        }
                        _ => Poll::Ready(Some(Err(e))),
                    }
                }
                Poll::Pending => match Pin::new(&mut self.rx).poll_next(cx) {
                    Poll::Ready(Some(item)) => Poll::Ready(Some(Ok(item))),
                    _ => Poll::Pending,
                },
            },
            None => Poll::Ready(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[test]
    fn produces_all_items_in_order() {
        let strm = AsyncStream::<u32, std::io::Error>::new(|mut tx| async move {
            for i in 0..10u32 {
                tx.send(i).await;
            }
            Ok(())
        });
        let items: Vec<u32> = futures_executor::block_on(async {
            strm.map(|r| r.unwrap()).collect::<Vec<_>>().await
        });
        assert_eq!(items, (0..10).collect::<Vec<u32>>());
    }

    #[test]
    fn error_terminates_stream() {
        let mut strm = AsyncStream::<u32, std::io::Error>::new(|mut tx| async move {
            tx.send(1u32).await;
            Err(std::io::Error::new(std::io::ErrorKind::Other, "boom"))
        });
        futures_executor::block_on(async {
            assert_eq!(strm.next().await.unwrap().unwrap(), 1);
            assert!(strm.next().await.unwrap().is_err());
            assert!(strm.next().await.is_none());
        });
    }
}
