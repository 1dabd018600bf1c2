//! Server-side streams seen by interceptors and streaming handlers

use crate::context::CallContext;
use async_trait::async_trait;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tonic::metadata::{KeyAndValueRef, KeyRef, MetadataMap};
use tonic::{Code, Request, Status};

/// Capacity of the outbound message buffer for tonic-backed streams
const RESPONSE_BUFFER: usize = 16;

/// Metadata side of a server stream
///
/// Object safe, so interceptors can work on any stream without knowing its
/// message types.
pub trait StreamMetadata: Send {
    /// Execution context of the call
    fn context(&self) -> &CallContext;

    /// Add trailer metadata sent when the call completes
    ///
    /// Keys present in `trailer` replace any values set earlier under them.
    fn set_trailer(&mut self, trailer: MetadataMap);
}

/// A bidirectional server stream
#[async_trait]
pub trait ServerStream: StreamMetadata {
    type Inbound: Send + 'static;
    type Outbound: Send + 'static;

    /// Receive the next inbound message, `None` once the client half-closes
    async fn recv_message(&mut self) -> Result<Option<Self::Inbound>, Status>;

    /// Send one outbound message
    async fn send_message(&mut self, message: Self::Outbound) -> Result<(), Status>;
}

/// Type-erased server stream handed to streaming handlers
pub type BoxServerStream<In, Out> = Box<dyn ServerStream<Inbound = In, Outbound = Out>>;

impl<S: StreamMetadata + ?Sized> StreamMetadata for Box<S> {
    fn context(&self) -> &CallContext {
        (**self).context()
    }

    fn set_trailer(&mut self, trailer: MetadataMap) {
        (**self).set_trailer(trailer)
    }
}

#[async_trait]
impl<S: ServerStream + ?Sized> ServerStream for Box<S> {
    type Inbound = S::Inbound;
    type Outbound = S::Outbound;

    async fn recv_message(&mut self) -> Result<Option<Self::Inbound>, Status> {
        (**self).recv_message().await
    }

    async fn send_message(&mut self, message: Self::Outbound) -> Result<(), Status> {
        (**self).send_message(message).await
    }
}

/// Stream decorator that substitutes the execution context
///
/// Everything except [`StreamMetadata::context`] is forwarded to the wrapped
/// stream unchanged.
pub struct AuthWrappedStream<S> {
    inner: S,
    context: CallContext,
}

impl<S> AuthWrappedStream<S> {
    pub fn new(inner: S, context: CallContext) -> Self {
        Self { inner, context }
    }

    /// The wrapped stream
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: StreamMetadata> StreamMetadata for AuthWrappedStream<S> {
    fn context(&self) -> &CallContext {
        &self.context
    }

    fn set_trailer(&mut self, trailer: MetadataMap) {
        self.inner.set_trailer(trailer)
    }
}

#[async_trait]
impl<S: ServerStream> ServerStream for AuthWrappedStream<S> {
    type Inbound = S::Inbound;
    type Outbound = S::Outbound;

    async fn recv_message(&mut self) -> Result<Option<Self::Inbound>, Status> {
        self.inner.recv_message().await
    }

    async fn send_message(&mut self, message: Self::Outbound) -> Result<(), Status> {
        self.inner.send_message(message).await
    }
}

/// Outbound half returned to tonic as the response body
pub type ResponseStream<Resp> = ReceiverStream<Result<Resp, Status>>;

type InboundStream<Req> = Pin<Box<dyn Stream<Item = Result<Req, Status>> + Send>>;

/// [`ServerStream`] over a tonic streaming request
///
/// Outbound messages go through a bounded channel whose receiver becomes the
/// response stream. Trailers are held until [`StreamCompletion::finish`].
pub struct TonicServerStream<Req, Resp> {
    context: CallContext,
    inbound: InboundStream<Req>,
    outbound: mpsc::Sender<Result<Resp, Status>>,
    trailer: Arc<Mutex<MetadataMap>>,
}

impl<Req, Resp> TonicServerStream<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    /// Split a streaming request into the handler's stream, the completion
    /// handle and the response stream to return to tonic
    pub fn from_request<St>(
        request: Request<St>,
    ) -> (Self, StreamCompletion<Resp>, ResponseStream<Resp>)
    where
        St: Stream<Item = Result<Req, Status>> + Send + 'static,
    {
        let context = CallContext::from_request(&request);
        let (tx, rx) = mpsc::channel(RESPONSE_BUFFER);
        let trailer = Arc::new(Mutex::new(MetadataMap::new()));

        let stream = Self {
            context,
            inbound: Box::pin(request.into_inner()),
            outbound: tx.clone(),
            trailer: Arc::clone(&trailer),
        };
        let completion = StreamCompletion {
            outbound: tx,
            trailer,
        };

        (stream, completion, ReceiverStream::new(rx))
    }
}

impl<Req, Resp> StreamMetadata for TonicServerStream<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn context(&self) -> &CallContext {
        &self.context
    }

    fn set_trailer(&mut self, trailer: MetadataMap) {
        let mut slot = self.trailer.lock().unwrap_or_else(PoisonError::into_inner);
        replace_metadata(&mut slot, &trailer);
    }
}

#[async_trait]
impl<Req, Resp> ServerStream for TonicServerStream<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    type Inbound = Req;
    type Outbound = Resp;

    async fn recv_message(&mut self) -> Result<Option<Req>, Status> {
        self.inbound.next().await.transpose()
    }

    async fn send_message(&mut self, message: Resp) -> Result<(), Status> {
        self.outbound
            .send(Ok(message))
            .await
            .map_err(|_| Status::cancelled("response stream closed by client"))
    }
}

/// Completion handle for a [`TonicServerStream`]
pub struct StreamCompletion<Resp> {
    outbound: mpsc::Sender<Result<Resp, Status>>,
    trailer: Arc<Mutex<MetadataMap>>,
}

impl<Resp> StreamCompletion<Resp> {
    /// Terminate the response stream with the handler's result
    ///
    /// tonic only emits trailers from a terminal status, so a successful call
    /// with trailers ends on an `Ok` status carrying them.
    pub async fn finish(self, result: Result<(), Status>) {
        let trailer = {
            let mut slot = self.trailer.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *slot)
        };

        let terminal = match result {
            Ok(()) if trailer.is_empty() => return,
            Ok(()) => Status::with_metadata(Code::Ok, "", trailer),
            Err(mut status) => {
                merge_metadata(status.metadata_mut(), &trailer);
                status
            }
        };

        if self.outbound.send(Err(terminal)).await.is_err() {
            tracing::debug!("Client went away before the stream completed");
        }
    }
}

/// Copy `from` into `into`, dropping earlier values under the same keys
fn replace_metadata(into: &mut MetadataMap, from: &MetadataMap) {
    for key in from.keys() {
        match key {
            KeyRef::Ascii(key) => {
                into.remove(key);
            }
            KeyRef::Binary(key) => {
                into.remove_bin(key);
            }
        }
    }
    merge_metadata(into, from);
}

/// Append every entry of `from` to `into`
fn merge_metadata(into: &mut MetadataMap, from: &MetadataMap) {
    for entry in from.iter() {
        match entry {
            KeyAndValueRef::Ascii(key, value) => {
                into.append(key.clone(), value.clone());
            }
            KeyAndValueRef::Binary(key, value) => {
                into.append_bin(key.clone(), value.clone());
            }
        }
    }
}
