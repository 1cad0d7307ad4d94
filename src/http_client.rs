use hyper::Request;
use hyper_util::client::legacy::{connect::Connect, Client, ResponseFuture};

use crate::request_body::RequestBody;

/// A trait for the underlying HTTP client.
///
/// Currently only implemented for `hyper_util::client::legacy::Client`;
/// it's impossible to plug in another HTTP client. This is sealed
/// deliberately: the signature is expected to change (e.g. to support
/// runtimes other than tokio), so prefer opening a feature request over
/// implementing it manually.
pub trait HttpClient: sealed::Sealed + Send + Sync + 'static {
    fn request(&self, req: Request<RequestBody>) -> ResponseFuture;
}

impl<C> HttpClient for Client<C, RequestBody>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    fn request(&self, req: Request<RequestBody>) -> ResponseFuture {
        self.request(req)
    }
}

impl<C> sealed::Sealed for Client<C, RequestBody> where C: Connect + Clone + Send + Sync + 'static {}

mod sealed {
    pub trait Sealed {}
}
