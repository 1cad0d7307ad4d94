#![cfg(feature = "test-util")]

use bytes::{BufMut, BytesMut};
use clickhouse_wire::test_util::{failure, provide, raw, Mock};
use clickhouse_wire::{Client, Value};

#[tokio::test]
async fn fetch_all_decodes_rows_from_the_header_onward() {
    let mock = Mock::new();
    let columns = vec![clickhouse_types::Column {
        name: "n".to_string(),
        data_type: clickhouse_types::DataTypeNode::UInt32,
    }];
    mock.add(provide(
        columns,
        vec![vec![Value::UInt32(1)], vec![Value::UInt32(2)]],
    ));

    let client = Client::default().with_url(mock.url());
    let rows = client
        .query("SELECT n FROM t")
        .fetch_all()
        .await
        .unwrap();

    assert_eq!(rows, vec![vec![Value::UInt32(1)], vec![Value::UInt32(2)]]);
}

#[tokio::test]
async fn trailing_bytes_after_the_last_row_are_a_protocol_error() {
    let mock = Mock::new();

    let columns = vec![clickhouse_types::Column {
        name: "n".to_string(),
        data_type: clickhouse_types::DataTypeNode::UInt32,
    }];
    let mut body = BytesMut::new();
    clickhouse_types::put_rbwnat_columns_header(&columns, &mut body).unwrap();
    // A `UInt32` needs 4 bytes; leave only 2 dangling after the header.
    body.put_slice(&[0xAA, 0xBB]);
    let body = body.freeze();

    mock.add(raw(move |_req| hyper::Response::new(body)));

    let client = Client::default().with_url(mock.url());
    let err = client
        .query("SELECT n FROM t")
        .fetch_all()
        .await
        .unwrap_err();

    assert!(matches!(err, clickhouse_wire::Error::Protocol(_)));
}

#[tokio::test]
async fn server_error_status_surfaces_as_bad_response() {
    let mock = Mock::new();
    mock.add(failure(hyper::StatusCode::INTERNAL_SERVER_ERROR));

    let client = Client::default().with_url(mock.url());
    let err = client.query("SELECT 1").execute().await.unwrap_err();

    assert!(matches!(err, clickhouse_wire::Error::BadResponse(_)));
}
