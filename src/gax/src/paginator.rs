// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::Result;
use crate::error::Error;
use crate::pipeline::Pipeline;
use crate::request::Request;
use futures::stream::unfold;
use futures::{Stream, StreamExt};
use pin_project::pin_project;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// One page of a collection, with the token to fetch the next page.
#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
    items: Vec<T>,
    continuation_token: Option<String>,
}

impl<T> Page<T> {
    /// Creates a page. An empty token means there are no more pages.
    pub fn new(items: Vec<T>, continuation_token: Option<String>) -> Self {
        Self {
            items,
            continuation_token: continuation_token.filter(|t| !t.is_empty()),
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn continuation_token(&self) -> Option<&str> {
        self.continuation_token.as_deref()
    }

    pub fn into_parts(self) -> (Vec<T>, Option<String>) {
        (self.items, self.continuation_token)
    }
}

enum State<F> {
    First(F),
    Next(String),
    Done,
}

/// An adapter that converts a paginated collection into a
/// [futures::Stream] of pages.
///
/// The stream is lazy: no page is fetched until the stream is polled. It
/// stops after the first page without a continuation token, or after the
/// first error. It cannot be restarted, create a new paginator to fetch the
/// collection again.
#[pin_project]
pub struct Paginator<T> {
    #[pin]
    stream: Pin<Box<dyn Stream<Item = Result<Page<T>>> + Send>>,
}

impl<T> Paginator<T>
where
    T: Send + 'static,
{
    /// Creates a new [Paginator] given the functions to fetch the first page
    /// and the subsequent pages.
    ///
    /// # Example
    /// ```
    /// # use cloud_client_gax::paginator::{Page, Paginator};
    /// # tokio_test::block_on(async {
    /// let mut paginator = Paginator::new(
    ///     || async { Ok(Page::new(vec![1, 2], Some("next".to_string()))) },
    ///     |_token| async { Ok(Page::new(vec![3], None)) },
    /// );
    /// let mut count = 0;
    /// while let Some(page) = paginator.next_page().await {
    ///     count += page?.items().len();
    /// }
    /// assert_eq!(count, 3);
    /// # Ok::<(), cloud_client_gax::error::Error>(())
    /// # });
    /// ```
    pub fn new<F1, Fut1, F2, Fut2>(first_page: F1, next_page: F2) -> Self
    where
        F1: FnOnce() -> Fut1 + Send + 'static,
        Fut1: Future<Output = Result<Page<T>>> + Send + 'static,
        F2: Fn(String) -> Fut2 + Send + Sync + 'static,
        Fut2: Future<Output = Result<Page<T>>> + Send + 'static,
    {
        let next_page = Arc::new(next_page);
        let stream = unfold(State::First(first_page), move |state| {
            let next_page = next_page.clone();
            async move {
                let page = match state {
                    State::First(f) => f().await,
                    State::Next(token) => next_page(token).await,
                    State::Done => return None,
                };
                match page {
                    Ok(page) => {
                        let next = match page.continuation_token() {
                            Some(token) => State::Next(token.to_string()),
                            None => State::Done,
                        };
                        Some((Ok(page), next))
                    }
                    Err(e) => Some((Err(e), State::Done)),
                }
            }
        });
        Self {
            stream: Box::pin(stream),
        }
    }

    /// Returns the next page, or `None` when the collection is exhausted.
    pub async fn next_page(&mut self) -> Option<Result<Page<T>>> {
        StreamExt::next(self).await
    }

    /// Flattens the pages into a stream of items.
    pub fn items(self) -> ItemPaginator<T> {
        ItemPaginator {
            pages: self,
            buffer: VecDeque::new(),
        }
    }
}

impl<T> Stream for Paginator<T> {
    type Item = Result<Page<T>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().stream.poll_next(cx)
    }
}

impl<T> std::fmt::Debug for Paginator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Paginator").finish_non_exhaustive()
    }
}

/// A stream of the items in a paginated collection.
///
/// Items in a page preserve the order returned by the service. The stream
/// returns an error, and then stops, if fetching a page fails.
#[pin_project]
pub struct ItemPaginator<T> {
    #[pin]
    pages: Paginator<T>,
    buffer: VecDeque<T>,
}

impl<T> ItemPaginator<T>
where
    T: Send + 'static,
{
    /// Returns the next item, or `None` when the collection is exhausted.
    pub async fn next(&mut self) -> Option<Result<T>> {
        StreamExt::next(self).await
    }
}

impl<T> Stream for ItemPaginator<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            if let Some(item) = this.buffer.pop_front() {
                return Poll::Ready(Some(Ok(item)));
            }
            match futures::ready!(this.pages.as_mut().poll_next(cx)) {
                Some(Ok(page)) => this.buffer.extend(page.into_items()),
                Some(Err(e)) => return Poll::Ready(Some(Err(e))),
                None => return Poll::Ready(None),
            }
        }
    }
}

/// How [json_pages] passes the continuation token to the service.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum TokenMode {
    /// The token is the URL of the next page. Relative URLs are resolved
    /// against the original request URL.
    #[default]
    FollowUrl,
    /// The token is sent in the named query parameter.
    QueryParameter(String),
}

/// Describes the JSON layout of each page.
#[derive(Clone, Debug, PartialEq)]
pub struct PageFormat {
    items_field: String,
    next_field: String,
    token: TokenMode,
}

impl PageFormat {
    pub fn with_items_field<V: Into<String>>(mut self, v: V) -> Self {
        self.items_field = v.into();
        self
    }

    pub fn with_next_field<V: Into<String>>(mut self, v: V) -> Self {
        self.next_field = v.into();
        self
    }

    pub fn with_token_mode(mut self, v: TokenMode) -> Self {
        self.token = v;
        self
    }
}

impl Default for PageFormat {
    /// Items in `value`, the URL of the next page in `nextLink`.
    fn default() -> Self {
        Self {
            items_field: "value".to_string(),
            next_field: "nextLink".to_string(),
            token: TokenMode::FollowUrl,
        }
    }
}

/// Fetches a collection with JSON pages through a [Pipeline].
///
/// Each page is a full round trip through the pipeline, so page requests are
/// retried and logged like any other request. Responses with a 4xx or 5xx
/// status code are reported as errors and end the stream.
///
/// # Example
/// ```no_run
/// # use cloud_client_gax::paginator::*;
/// # use cloud_client_gax::pipeline::Pipeline;
/// # use cloud_client_gax::request::Request;
/// # async fn sample(pipeline: Pipeline) -> cloud_client_gax::Result<()> {
/// let url = url::Url::parse("https://example.com/v1/things").unwrap();
/// let mut items = json_pages::<serde_json::Value>(
///     pipeline,
///     Request::new(http::Method::GET, url),
///     PageFormat::default(),
/// ).items();
/// while let Some(item) = items.next().await {
///     println!("{}", item?);
/// }
/// # Ok(()) }
/// ```
pub fn json_pages<T>(pipeline: Pipeline, request: Request, format: PageFormat) -> Paginator<T>
where
    T: serde::de::DeserializeOwned + Send + 'static,
{
    let format = Arc::new(format);
    let first = {
        let (pipeline, request, format) = (pipeline.clone(), request.clone(), format.clone());
        move || async move { fetch_json_page(&pipeline, request, &format).await }
    };
    let next = move |token: String| {
        let (pipeline, request, format) = (pipeline.clone(), request.clone(), format.clone());
        async move {
            let request = next_page_request(request, &format.token, &token)?;
            fetch_json_page(&pipeline, request, &format).await
        }
    };
    Paginator::new(first, next)
}

fn next_page_request(mut request: Request, mode: &TokenMode, token: &str) -> Result<Request> {
    match mode {
        TokenMode::FollowUrl => {
            let url = request.url().join(token).map_err(Error::validation)?;
            *request.url_mut() = url;
        }
        TokenMode::QueryParameter(name) => {
            let pairs: Vec<(String, String)> = request
                .url()
                .query_pairs()
                .filter(|(k, _)| k != name)
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            request
                .url_mut()
                .query_pairs_mut()
                .clear()
                .extend_pairs(pairs)
                .append_pair(name, token);
        }
    }
    Ok(request)
}

async fn fetch_json_page<T>(
    pipeline: &Pipeline,
    request: Request,
    format: &PageFormat,
) -> Result<Page<T>>
where
    T: serde::de::DeserializeOwned,
{
    let response = pipeline.send(request).await?.error_for_status()?;
    let mut body = response.json::<serde_json::Value>()?;
    let items = match body.get_mut(&format.items_field).map(serde_json::Value::take) {
        None | Some(serde_json::Value::Null) => Vec::new(),
        Some(v) => serde_json::from_value::<Vec<T>>(v).map_err(Error::deser)?,
    };
    let token = body
        .get(&format.next_field)
        .and_then(serde_json::Value::as_str)
        .map(str::to_string);
    Ok(Page::new(items, token))
}
