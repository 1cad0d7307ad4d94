//! The query façade: renders SQL parameters, issues the HTTP request, and
//! hands back either a row reader or a one-shot result.

use bytes::Bytes;
use hyper::{
    header::{ACCEPT_ENCODING, CONTENT_LENGTH},
    Method, Request,
};
use url::Url;

use crate::{
    error::{Error, Result},
    request_body::RequestBody,
    response::Response,
    sql::render_query,
    value::{Params, Row, Value},
    Client, RowCursor, Summary,
};

const MAX_QUERY_LEN_TO_USE_GET: usize = 8192;

/// A single query, built up with [`Query::bind`] before being turned into a
/// result via [`Query::execute`], [`Query::scalar`], or [`Query::reader`].
#[must_use]
#[derive(Clone)]
pub struct Query {
    client: Client,
    template: String,
    params: Params,
}

impl Query {
    pub(crate) fn new(client: &Client, template: &str) -> Self {
        Self {
            client: client.clone(),
            template: template.to_string(),
            params: Params::new(),
        }
    }

    /// Binds a value to a `{name}`/`{name:Type}` placeholder in the template.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params = self.params.bind(name, value);
        self
    }

    /// Runs the query, discarding any result rows, and returns the server's
    /// read/write counters.
    pub async fn execute(self) -> Result<Summary> {
        let rendered = render_query(&self.template, &self.params)?;
        let summary_slot = std::sync::Arc::new(std::sync::Mutex::new(None));
        let mut response = self.do_request(&rendered, false, summary_slot.clone())?;
        response.finish().await?;
        let summary = summary_slot.lock().unwrap().clone().unwrap_or_default();
        Ok(summary)
    }

    /// Opens a streaming reader over the query's result rows.
    pub async fn reader(self) -> Result<RowCursor> {
        let rendered = render_query(&self.template, &self.params)?;
        let rendered = format!("{rendered} FORMAT RowBinaryWithNamesAndTypes");
        let summary_slot = std::sync::Arc::new(std::sync::Mutex::new(None));
        let response = self.do_request(&rendered, true, summary_slot)?;
        Ok(RowCursor::new(response))
    }

    /// Returns the first column of the first row, or `None` if the result is empty.
    pub async fn scalar(self) -> Result<Option<Value>> {
        let mut cursor = self.reader().await?;
        match cursor.next().await? {
            Some(row) => Ok(row.into_iter().next()),
            None => Ok(None),
        }
    }

    /// Fetches every row eagerly.
    pub async fn fetch_all(self) -> Result<Vec<Row>> {
        let mut cursor = self.reader().await?;
        let mut rows = Vec::new();
        while let Some(row) = cursor.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    fn do_request(
        &self,
        query: &str,
        read_only: bool,
        summary_slot: std::sync::Arc<std::sync::Mutex<Option<Summary>>>,
    ) -> Result<Response> {
        let mut url = Url::parse(&self.client.url).map_err(|err| Error::Config(err.to_string()))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.clear();

            if let Some(database) = &self.client.database {
                pairs.append_pair("database", database);
            }
            if self.client.compression.encoding().is_some() {
                pairs.append_pair("enable_http_compression", "1");
            }
            #[cfg(feature = "lz4")]
            if self.client.compression == crate::Compression::Lz4 {
                pairs.append_pair("compress", "1");
            }
            for (name, value) in &self.client.options {
                pairs.append_pair(name, value);
            }
        }

        let use_post = !read_only || query.len() > MAX_QUERY_LEN_TO_USE_GET;
        let method = if use_post { Method::POST } else { Method::GET };

        let body = if use_post {
            RequestBody::full(Bytes::copy_from_slice(query.as_bytes()))
        } else {
            url.query_pairs_mut().append_pair("query", query);
            if read_only {
                url.query_pairs_mut().append_pair("readonly", "1");
            }
            RequestBody::empty()
        };

        let mut builder = Request::builder()
            .method(method)
            .uri(url.as_str())
            .header(CONTENT_LENGTH, if use_post { query.len() } else { 0 }.to_string())
            .header("X-ClickHouse-Query-Id", uuid::Uuid::new_v4().to_string());

        builder = crate::headers::with_request_headers(
            builder,
            &std::collections::HashMap::new(),
            &self.client.products_info,
        );
        builder = crate::headers::with_authentication(builder, &self.client.authentication);

        if let Some(database) = &self.client.database {
            builder = builder.header("X-ClickHouse-Database", database);
        }

        if let Some(encoding) = self.client.compression.encoding() {
            builder = builder.header(ACCEPT_ENCODING, encoding);
        }

        let request = builder
            .body(body)
            .map_err(|err| Error::Config(err.to_string()))?;

        let future = self.client.http.request(request);
        Ok(Response::with_summary_slot(
            future,
            self.client.compression,
            summary_slot,
        ))
    }
}
