//! Fetch pagination.
//!
//! One [`Paginator`] serves all three signal kinds; [`Fetchable`] binds a
//! request message to its client call and cursor plumbing. The paginator
//! starts with one unattempted page and keeps going while responses carry a
//! non-empty `next_cursor`; advancing past the last page is an error.

use std::future::Future;

use oteldepot_proto::{
    FetchLogsDataRequest, FetchLogsDataResponse, FetchMetricsDataRequest,
    FetchMetricsDataResponse, FetchTracesDataRequest, FetchTracesDataResponse,
};

use crate::{Client, ClientError};

/// A fetch request message that can drive the paginator.
pub trait Fetchable: Clone + Send + Sync {
    type Response: Send;

    fn set_cursor(&mut self, cursor: String);

    fn next_cursor(response: &Self::Response) -> &str;

    fn fetch(
        client: &Client,
        request: &Self,
    ) -> impl Future<Output = Result<Self::Response, ClientError>> + Send;
}

impl Fetchable for FetchTracesDataRequest {
    type Response = FetchTracesDataResponse;

    fn set_cursor(&mut self, cursor: String) {
        self.cursor = cursor;
    }

    fn next_cursor(response: &Self::Response) -> &str {
        &response.next_cursor
    }

    fn fetch(
        client: &Client,
        request: &Self,
    ) -> impl Future<Output = Result<Self::Response, ClientError>> + Send {
        client.fetch_traces_data(request)
    }
}

impl Fetchable for FetchMetricsDataRequest {
    type Response = FetchMetricsDataResponse;

    fn set_cursor(&mut self, cursor: String) {
        self.cursor = cursor;
    }

    fn next_cursor(response: &Self::Response) -> &str {
        &response.next_cursor
    }

    fn fetch(
        client: &Client,
        request: &Self,
    ) -> impl Future<Output = Result<Self::Response, ClientError>> + Send {
        client.fetch_metrics_data(request)
    }
}

impl Fetchable for FetchLogsDataRequest {
    type Response = FetchLogsDataResponse;

    fn set_cursor(&mut self, cursor: String) {
        self.cursor = cursor;
    }

    fn next_cursor(response: &Self::Response) -> &str {
        &response.next_cursor
    }

    fn fetch(
        client: &Client,
        request: &Self,
    ) -> impl Future<Output = Result<Self::Response, ClientError>> + Send {
        client.fetch_logs_data(request)
    }
}

/// Iterates fetch responses by chaining `next_cursor` until empty.
pub struct Paginator<'a, R: Fetchable> {
    client: &'a Client,
    request: R,
    first_page: bool,
    has_more: bool,
}

impl<'a, R: Fetchable> Paginator<'a, R> {
    pub fn new(client: &'a Client, request: R) -> Self {
        Self {
            client,
            request,
            first_page: true,
            has_more: false,
        }
    }

    /// True until a response comes back with an empty `next_cursor`. The
    /// first page is always available.
    pub fn has_more_pages(&self) -> bool {
        self.first_page || self.has_more
    }

    /// Fetch the next page, storing its cursor for the following call.
    pub async fn next_page(&mut self) -> Result<R::Response, ClientError> {
        if !self.has_more_pages() {
            return Err(ClientError::NoMorePages);
        }

        let response = R::fetch(self.client, &self.request).await?;
        self.first_page = false;

        let next_cursor = R::next_cursor(&response);
        if next_cursor.is_empty() {
            tracing::debug!("no more pages available");
            self.has_more = false;
            self.request.set_cursor(String::new());
        } else {
            tracing::debug!(next_cursor = %next_cursor, "more pages available");
            self.has_more = true;
            self.request.set_cursor(next_cursor.to_owned());
        }
        Ok(response)
    }
}
