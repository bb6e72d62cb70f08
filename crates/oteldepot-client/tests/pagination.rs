//! Paginator behavior against a stub depot server.

use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use oteldepot_client::{Client, ClientError, Paginator, Profile};
use oteldepot_proto::{FetchTracesDataRequest, FetchTracesDataResponse, Status as StatusProto};
use prost::Message;

#[derive(Clone, Default)]
struct StubState {
    /// Cursor carried by each request, in arrival order.
    seen_cursors: Arc<Mutex<Vec<String>>>,
    /// `next_cursor` values to hand out, one per request; empty terminates.
    script: Arc<Vec<&'static str>>,
}

async fn stub_fetch(State(state): State<StubState>, body: Bytes) -> impl IntoResponse {
    let request = FetchTracesDataRequest::decode(&body[..]).unwrap();
    let mut seen = state.seen_cursors.lock().unwrap();
    let page_index = seen.len();
    seen.push(request.cursor.clone());

    let response = FetchTracesDataResponse {
        resource_spans: Vec::new(),
        next_cursor: state.script.get(page_index).copied().unwrap_or("").to_owned(),
        has_more: state.script.get(page_index).is_some_and(|c| !c.is_empty()),
    };
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "application/x-protobuf")],
        response.encode_to_vec(),
    )
}

async fn start_stub(script: Vec<&'static str>) -> (StubState, String) {
    let state = StubState {
        seen_cursors: Arc::default(),
        script: Arc::new(script),
    };
    let router = Router::new()
        .route("/api/traces/fetch", post(stub_fetch))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (state, endpoint)
}

fn client_for(endpoint: &str) -> Client {
    Client::new(Profile {
        endpoint: endpoint.to_owned(),
        ..Profile::default()
    })
    .unwrap()
}

#[tokio::test]
async fn paginator_chains_cursors_until_empty() {
    let (state, endpoint) = start_stub(vec!["cursor-1", "cursor-2", ""]).await;
    let client = client_for(&endpoint);

    let mut paginator = Paginator::new(
        &client,
        FetchTracesDataRequest {
            start_time_unix_nano: 1,
            end_time_unix_nano: 2,
            cursor: String::new(),
            limit: 10,
        },
    );

    assert!(paginator.has_more_pages());
    let mut pages = 0;
    while paginator.has_more_pages() {
        paginator.next_page().await.unwrap();
        pages += 1;
        assert!(pages <= 3, "paginator did not terminate");
    }
    assert_eq!(pages, 3);

    let seen = state.seen_cursors.lock().unwrap().clone();
    assert_eq!(seen, vec!["", "cursor-1", "cursor-2"]);
}

#[tokio::test]
async fn paginator_terminates_after_single_page() {
    let (state, endpoint) = start_stub(vec![""]).await;
    let client = client_for(&endpoint);

    let mut paginator = Paginator::new(&client, FetchTracesDataRequest::default());
    assert!(paginator.has_more_pages());
    paginator.next_page().await.unwrap();
    assert!(!paginator.has_more_pages());
    assert_eq!(state.seen_cursors.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn next_page_after_termination_is_an_error() {
    let (_state, endpoint) = start_stub(vec![""]).await;
    let client = client_for(&endpoint);

    let mut paginator = Paginator::new(&client, FetchTracesDataRequest::default());
    paginator.next_page().await.unwrap();

    let err = paginator.next_page().await.unwrap_err();
    assert!(matches!(err, ClientError::NoMorePages));
}

#[tokio::test]
async fn error_envelope_surfaces_as_api_error() {
    let router = Router::new().route(
        "/api/traces/fetch",
        post(|| async {
            let envelope = StatusProto {
                code: oteldepot_proto::code::INVALID_ARGUMENT,
                message: "start time is required".to_owned(),
            };
            (
                StatusCode::BAD_REQUEST,
                [(CONTENT_TYPE, "application/x-protobuf")],
                envelope.encode_to_vec(),
            )
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let client = client_for(&endpoint);
    let err = client
        .fetch_traces_data(&FetchTracesDataRequest::default())
        .await
        .unwrap_err();
    match err {
        ClientError::Api { code, message } => {
            assert_eq!(code, oteldepot_proto::code::INVALID_ARGUMENT);
            assert_eq!(message, "start time is required");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn access_key_header_is_sent() {
    use axum::http::HeaderMap;

    let seen: Arc<Mutex<Vec<Option<String>>>> = Arc::default();
    let seen_in_handler = seen.clone();
    let router = Router::new().route(
        "/api/traces/fetch",
        post(move |headers: HeaderMap| {
            let seen = seen_in_handler.clone();
            async move {
                seen.lock().unwrap().push(
                    headers
                        .get("X-Depot-Key")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_owned),
                );
                (
                    StatusCode::OK,
                    [(CONTENT_TYPE, "application/x-protobuf")],
                    FetchTracesDataResponse::default().encode_to_vec(),
                )
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let client = Client::new(Profile {
        endpoint,
        access_key: "hunter2".to_owned(),
        access_key_header: "X-Depot-Key".to_owned(),
    })
    .unwrap();
    client
        .fetch_traces_data(&FetchTracesDataRequest::default())
        .await
        .unwrap();

    assert_eq!(
        seen.lock().unwrap().clone(),
        vec![Some("hunter2".to_owned())]
    );
}
