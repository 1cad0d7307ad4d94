//! A client for ClickHouse's binary row protocol and bulk-copy engine over HTTP.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
    time::Duration,
};

use bytes::Bytes;
use futures_util::Stream;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client as HyperClient},
    rt::TokioExecutor,
};

pub use self::{
    compression::Compression,
    error::{Error, Result},
    format::OutputFormat,
    headers::ProductInfo,
    value::{Params, Row, Value},
};
use self::headers::Authentication;
use self::http_client::HttpClient;

mod buflist;
pub mod bulk;
mod bytes_ext;
pub mod compression;
mod cursors;
pub mod error;
mod format;
mod headers;
mod http_client;
pub mod query;
mod request_body;
mod response;
mod rowbinary;
pub mod sql;
mod summary;
#[cfg(feature = "test-util")]
pub mod test_util;
mod value;

pub use cursors::RowCursor;
pub use summary::Summary;

const TCP_KEEPALIVE: Duration = Duration::from_secs(60);

/// An immutable handle to a ClickHouse server over HTTP.
///
/// Cloning a `Client` is cheap: the underlying HTTP connection pool and
/// settings record are shared via `Arc`. `with_*` builders consume `self`
/// and return a new `Client`, so building one up does not allocate a new
/// pool at each step.
#[derive(Clone)]
pub struct Client {
    pub(crate) http: Arc<dyn HttpClient>,
    pub(crate) url: String,
    pub(crate) database: Option<String>,
    pub(crate) authentication: Authentication,
    pub(crate) compression: Compression,
    pub(crate) options: HashMap<String, String>,
    pub(crate) products_info: Vec<ProductInfo>,
    json_schemas: Arc<RwLock<HashMap<String, String>>>,
}

impl Default for Client {
    fn default() -> Self {
        let mut connector = HttpConnector::new();
        connector.set_keepalive(Some(TCP_KEEPALIVE));

        let http = HyperClient::builder(TokioExecutor::new()).build(connector);

        Self {
            http: Arc::new(http),
            url: String::new(),
            database: None,
            authentication: Authentication::default(),
            compression: Compression::default(),
            options: HashMap::new(),
            products_info: Vec::new(),
            json_schemas: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Client {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.authentication.user = Some(user.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.authentication.password = Some(password.into());
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Sets a server setting (e.g. `max_threads`) applied as a query-string
    /// parameter on every request made through this client.
    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    /// Registers a `name/version` pair prepended to the `User-Agent` header,
    /// for applications built on top of this crate.
    pub fn with_product_info(
        mut self,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        self.products_info.push(ProductInfo {
            name: name.into(),
            version: version.into(),
        });
        self
    }

    /// Starts building a query against this client.
    pub fn query(&self, template: &str) -> query::Query {
        query::Query::new(self, template)
    }

    /// Copies `rows` into `table`'s `columns` using the bulk-copy pipeline.
    ///
    /// See [`bulk::bulk_copy`] for the batching/concurrency/failure model.
    pub async fn insert_binary<S>(
        &self,
        table: &str,
        columns: &[String],
        rows: S,
        opts: bulk::BulkCopyOptions,
    ) -> Result<bulk::BulkCopyResult>
    where
        S: Stream<Item = Row> + Unpin,
    {
        bulk::bulk_copy(self, table, columns, rows, opts).await
    }

    /// Streams a caller-encoded payload into `table` as an `INSERT ... FORMAT
    /// <format>`, without going through the Value Codec.
    ///
    /// `columns`, if given, restricts and orders the target columns; useful
    /// when `format` doesn't itself carry column names (e.g. `RowBinary`).
    pub async fn insert_raw_stream<S>(
        &self,
        table: &str,
        format: OutputFormat,
        columns: Option<&[String]>,
        mut stream: S,
    ) -> Result<()>
    where
        S: Stream<Item = Result<Bytes>> + Unpin,
    {
        use futures_util::StreamExt;

        let column_list = columns
            .map(|cols| format!(" ({})", cols.join(", ")))
            .unwrap_or_default();
        let insert_stmt = format!("INSERT INTO {table}{column_list} FORMAT {format}");

        let mut url = url::Url::parse(&self.url).map_err(|err| Error::Config(err.to_string()))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.clear();
            pairs.append_pair("query", &insert_stmt);
            if let Some(database) = &self.database {
                pairs.append_pair("database", database);
            }
            for (name, value) in &self.options {
                pairs.append_pair(name, value);
            }
        }

        let (mut sender, body) = request_body::RequestBody::chunked();
        let mut builder = hyper::Request::builder()
            .method(hyper::Method::POST)
            .uri(url.as_str());
        builder = headers::with_request_headers(builder, &HashMap::new(), &self.products_info);
        builder = headers::with_authentication(builder, &self.authentication);
        if let Some(database) = &self.database {
            builder = builder.header("X-ClickHouse-Database", database);
        }
        let request = builder
            .body(body)
            .map_err(|err| Error::Config(err.to_string()))?;

        let future = self.http.request(request);
        let summary_slot = Arc::new(std::sync::Mutex::new(None));
        let mut response = response::Response::with_summary_slot(future, Compression::None, summary_slot);

        let send_chunks = async {
            while let Some(chunk) = stream.next().await {
                sender.send(chunk?).await?;
            }
            sender.close();
            Ok::<_, Error>(())
        };

        let (send_result, finish_result) = tokio::join!(send_chunks, response.finish());
        send_result?;
        finish_result?;
        Ok(())
    }

    /// Issues a trivial `SELECT 1`, mapping any failure to `false`.
    pub async fn ping(&self) -> bool {
        self.query("SELECT 1").execute().await.is_ok()
    }

    /// Records a schema hint consulted by the Value Codec's JSON/Dynamic
    /// handling; does not itself touch the wire.
    pub fn register_json_type(&self, name: impl Into<String>, schema: impl Into<String>) {
        self.json_schemas
            .write()
            .unwrap()
            .insert(name.into(), schema.into());
    }
}
