use std::{collections::HashMap, env};

use hyper::http::request::Builder;

// See https://doc.rust-lang.org/cargo/reference/environment-variables.html#environment-variables-cargo-sets-for-crates
const PKG_VER: &str = env!("CARGO_PKG_VERSION");
const RUST_VER: &str = env!("CARGO_PKG_RUST_VERSION");

/// A `name/version` pair appended to the `User-Agent` header, for
/// applications built on top of this crate that want to identify
/// themselves to the server.
#[derive(Debug, Clone)]
pub struct ProductInfo {
    pub name: String,
    pub version: String,
}

impl std::fmt::Display for ProductInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}

fn get_user_agent(products_info: &[ProductInfo]) -> String {
    let os = env::consts::OS;
    let default_agent = format!("clickhouse-wire/{PKG_VER} (lv:rust/{RUST_VER}, os:{os})");
    if products_info.is_empty() {
        default_agent
    } else {
        let products = products_info
            .iter()
            .rev()
            .map(ProductInfo::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        format!("{products} {default_agent}")
    }
}

/// Credentials sent with every request via `X-ClickHouse-*` headers, as
/// opposed to embedding `user`/`password` in the query string.
#[derive(Debug, Clone, Default)]
pub(crate) struct Authentication {
    pub(crate) user: Option<String>,
    pub(crate) password: Option<String>,
}

pub(crate) fn with_request_headers(
    mut builder: Builder,
    headers: &HashMap<String, String>,
    products_info: &[ProductInfo],
) -> Builder {
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    builder.header(hyper::header::USER_AGENT, get_user_agent(products_info))
}

pub(crate) fn with_authentication(mut builder: Builder, auth: &Authentication) -> Builder {
    if let Some(user) = &auth.user {
        builder = builder.header("X-ClickHouse-User", user);
    }
    if let Some(password) = &auth.password {
        builder = builder.header("X-ClickHouse-Key", password);
    }
    builder
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_without_products_is_just_the_crate_banner() {
        let agent = get_user_agent(&[]);
        assert!(agent.starts_with("clickhouse-wire/"));
    }

    #[test]
    fn user_agent_prepends_products_most_specific_first() {
        let products = vec![
            ProductInfo {
                name: "outer-app".into(),
                version: "1.0".into(),
            },
            ProductInfo {
                name: "inner-lib".into(),
                version: "2.0".into(),
            },
        ];
        let agent = get_user_agent(&products);
        assert!(agent.starts_with("inner-lib/2.0 outer-app/1.0 clickhouse-wire/"));
    }

    #[test]
    fn authentication_headers_are_only_set_when_present() {
        let builder = Builder::new();
        let auth = Authentication {
            user: Some("default".into()),
            password: None,
        };
        let request = with_authentication(builder, &auth)
            .body(())
            .unwrap();
        assert_eq!(
            request.headers().get("X-ClickHouse-User").unwrap(),
            "default"
        );
        assert!(request.headers().get("X-ClickHouse-Key").is_none());
    }
}
