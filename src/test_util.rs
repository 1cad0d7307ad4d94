//! An in-process mock HTTP server, for exercising [`crate::Client`] without a
//! live ClickHouse instance. Gated behind the `test-util` feature.

use std::{
    collections::VecDeque,
    error::Error as StdError,
    net::SocketAddr,
    sync::{Arc, Mutex},
    thread,
};

use bytes::{Bytes, BytesMut};
use clickhouse_types::{put_rbwnat_columns_header, Column};
use http_body_util::{BodyExt, Full};
use hyper::{body::Incoming, server::conn, service, Request, Response, StatusCode};
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::{net::TcpListener, task::AbortHandle};

use crate::{error::Result, rowbinary, value::Row};

/// One canned reply for the next request the mock server receives.
type HandlerFn = Box<dyn FnOnce(Request<Bytes>) -> Response<Bytes> + Send>;

/// Something [`Mock::add`] can turn into a canned reply.
///
/// `Control` is handed back to the test, e.g. to assert on what the server
/// actually received.
pub trait Handler {
    type Control;

    fn make(self) -> (HandlerFn, Self::Control);
}

struct RawHandler<F>(F);

impl<F> Handler for RawHandler<F>
where
    F: FnOnce(Request<Bytes>) -> Response<Bytes> + Send + 'static,
{
    type Control = ();

    fn make(self) -> (HandlerFn, ()) {
        (Box::new(self.0), ())
    }
}

/// Wraps a closure as a one-shot [`Handler`] that builds the response by hand.
pub fn raw(
    f: impl FnOnce(Request<Bytes>) -> Response<Bytes> + Send + 'static,
) -> impl Handler<Control = ()> {
    RawHandler(f)
}

/// Replies with `status` and its canonical reason phrase as the body.
pub fn failure(status: StatusCode) -> impl Handler<Control = ()> {
    raw(move |_req| {
        let reason = status.canonical_reason().unwrap_or("<unknown status code>");
        Response::builder()
            .status(status)
            .body(Bytes::copy_from_slice(reason.as_bytes()))
            .expect("invalid builder")
    })
}

/// Replies with `rows` encoded as `RowBinaryWithNamesAndTypes` against
/// `columns`, as if a `SELECT` had produced them.
pub fn provide(columns: Vec<Column>, rows: Vec<Row>) -> impl Handler<Control = ()> {
    raw(move |_req| {
        let mut buffer = BytesMut::with_capacity(256);
        put_rbwnat_columns_header(&columns, &mut buffer).expect("non-empty column list");
        for row in &rows {
            rowbinary::encode_row(row, &columns, &mut buffer).expect("row matches column types");
        }
        Response::new(buffer.freeze())
    })
}

/// A handle returned by [`recording_insert`] exposing what the client sent.
#[derive(Clone)]
pub struct RecordedRequest(Arc<Mutex<Option<Bytes>>>);

impl RecordedRequest {
    /// The request body the server received, once the handler has run.
    pub fn body(&self) -> Bytes {
        self.0
            .lock()
            .unwrap()
            .clone()
            .expect("handler has not run yet")
    }
}

/// Accepts an insert-shaped request, records its body, and replies with a
/// summary reporting `rows_written`.
pub fn recording_insert(rows_written: u64) -> impl Handler<Control = RecordedRequest> {
    struct RecordingHandler(Arc<Mutex<Option<Bytes>>>, u64);

    impl Handler for RecordingHandler {
        type Control = RecordedRequest;

        fn make(self) -> (HandlerFn, RecordedRequest) {
            let slot = self.0.clone();
            let rows_written = self.1;
            let handler: HandlerFn = Box::new(move |req| {
                *slot.lock().unwrap() = Some(req.into_body());
                Response::builder()
                    .header(
                        "X-ClickHouse-Summary",
                        format!(
                            r#"{{"read_rows":"0","read_bytes":"0","written_rows":"{rows_written}","written_bytes":"0","total_rows_to_read":"0","result_rows":"0","result_bytes":"0","elapsed_ns":"0"}}"#
                        ),
                    )
                    .body(Bytes::new())
                    .expect("invalid builder")
            });
            (handler, RecordedRequest(self.0))
        }
    }

    RecordingHandler(Arc::new(Mutex::new(None)), rows_written)
}

/// A mock server for testing.
pub struct Mock {
    url: String,
    shared: Arc<Mutex<Shared>>,
    non_exhaustive: bool,
    server_handle: AbortHandle,
}

#[derive(Default)]
struct Shared {
    handlers: VecDeque<HandlerFn>,
    error: Option<Box<dyn StdError + Send + Sync>>,
}

impl Mock {
    /// Starts a new test server and returns a handle to it.
    #[track_caller]
    pub fn new() -> Self {
        let (addr, listener) = {
            let addr = SocketAddr::from(([127, 0, 0, 1], 0));
            let listener = std::net::TcpListener::bind(addr).expect("cannot bind a listener");
            listener
                .set_nonblocking(true)
                .expect("cannot set non-blocking mode");
            let addr = listener.local_addr().expect("cannot get a local address");
            let listener = TcpListener::from_std(listener).expect("cannot convert to tokio");
            (addr, listener)
        };

        let shared = Arc::new(Mutex::new(Shared::default()));
        let server_handle = tokio::spawn(server(listener, shared.clone()));

        Self {
            url: format!("http://{addr}"),
            shared,
            non_exhaustive: false,
            server_handle: server_handle.abort_handle(),
        }
    }

    /// The test server's URL, to hand to [`crate::Client::with_url`].
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Enqueues a handler to answer the next request.
    ///
    /// Can be called multiple times to enqueue multiple handlers. Unless
    /// [`Mock::non_exhaustive`] is called, the destructor panics if any
    /// enqueued handler went unused.
    #[track_caller]
    pub fn add<H: Handler>(&self, handler: H) -> H::Control {
        self.propagate_server_error();

        if self.server_handle.is_finished() {
            panic!("impossible to add a handler: the test server is terminated");
        }

        let (handler, control) = handler.make();
        self.shared.lock().unwrap().handlers.push_back(handler);
        control
    }

    /// Allows unused handlers to be left after the test ends.
    pub fn non_exhaustive(&mut self) {
        self.non_exhaustive = true;
    }

    #[track_caller]
    fn propagate_server_error(&self) {
        if let Some(error) = &self.shared.lock().unwrap().error {
            panic!("server error: {error}");
        }
    }
}

impl Default for Mock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Mock {
    fn drop(&mut self) {
        self.server_handle.abort();

        if thread::panicking() {
            return;
        }

        self.propagate_server_error();

        if !self.non_exhaustive && !self.shared.lock().unwrap().handlers.is_empty() {
            panic!("test ended, but not all responses have been consumed");
        }
    }
}

async fn server(listener: TcpListener, shared: Arc<Mutex<Shared>>) {
    let error = loop {
        let stream = match listener.accept().await {
            Ok((stream, _)) => stream,
            Err(err) => break err.into(),
        };

        let serving = conn::http1::Builder::new()
            .timer(TokioTimer::new())
            .keep_alive(false)
            .serve_connection(
                TokioIo::new(stream),
                service::service_fn(|request| handle(request, &shared)),
            );

        if let Err(err) = serving.await {
            break if let Some(source) = err.source() {
                source.to_string().into()
            } else {
                err.into()
            };
        }
    };

    shared.lock().unwrap().error.get_or_insert(error);
}

async fn handle(
    request: Request<Incoming>,
    shared: &Mutex<Shared>,
) -> Result<Response<Full<Bytes>>, Box<dyn StdError + Send + Sync>> {
    let Some(handler) = shared.lock().unwrap().handlers.pop_front() else {
        return Err("no installed handler for an incoming request".into());
    };

    let (parts, body) = request.into_parts();
    let body = body.collect().await?.to_bytes();

    let request = Request::from_parts(parts, body);
    let response = handler(request).map(Full::new);

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clickhouse_types::DataTypeNode;

    #[tokio::test]
    async fn serves_one_enqueued_response_per_request() {
        let mock = Mock::new();
        mock.add(failure(StatusCode::INTERNAL_SERVER_ERROR));

        let response = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
            .build_http::<Full<Bytes>>()
            .request(
                Request::builder()
                    .uri(mock.url())
                    .body(Full::new(Bytes::new()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn provide_encodes_a_valid_header_and_rows() {
        let columns = vec![Column {
            name: "n".to_string(),
            data_type: DataTypeNode::UInt32,
        }];
        let _ = provide(columns, vec![vec![crate::Value::UInt32(1)]]);
    }
}
