//! Cursor-following enumeration of albums and media items
//!
//! [`paginate`] turns a page-fetch function into a lazy stream of items.
//! [`AlbumCatalog`] and [`MediaCatalog`] apply it to the two list endpoints.
//!
//! Pages are fetched only as the stream is pulled, items come out in server
//! order, and a failed page surfaces as a [`CatalogError`] after every item
//! from earlier pages has already been yielded. There is no retry here.

mod albums;
mod media;

pub use albums::AlbumCatalog;
pub use media::MediaCatalog;

use crate::error::{CatalogError, Error, Result};
use crate::types::Page;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

enum Cursor {
    Start,
    Next(String),
    /// The server handed back a cursor it already gave us
    Repeated(String),
    Exhausted,
}

struct PageState<F> {
    fetch: F,
    cursor: Cursor,
    seen: HashSet<String>,
}

/// Enumerate every item behind a cursor-paginated endpoint
///
/// `fetch` receives `None` for the first page and the previous page's cursor
/// afterwards. Enumeration stops after a page with no (or an empty) next
/// cursor. `page_delay` is slept before every page except the first.
///
/// A cursor the server already returned once ends the stream with
/// [`Error::InvalidResponse`] instead of looping forever.
pub fn paginate<'a, T, F, Fut>(
    page_delay: Duration,
    fetch: F,
) -> BoxStream<'a, std::result::Result<T, CatalogError>>
where
    T: Send + 'a,
    F: FnMut(Option<String>) -> Fut + Send + 'a,
    Fut: Future<Output = Result<Page<T>>> + Send + 'a,
{
    let state = PageState {
        fetch,
        cursor: Cursor::Start,
        seen: HashSet::new(),
    };

    stream::try_unfold(state, move |mut state| async move {
        let request = match std::mem::replace(&mut state.cursor, Cursor::Exhausted) {
            Cursor::Start => None,
            Cursor::Next(token) => {
                if !page_delay.is_zero() {
                    tokio::time::sleep(page_delay).await;
                }
                Some(token)
            }
            Cursor::Repeated(token) => {
                return Err(CatalogError::new(
                    Some(token.clone()),
                    Error::InvalidResponse(format!("server repeated page cursor {}", token)),
                ));
            }
            Cursor::Exhausted => return Ok(None),
        };

        tracing::debug!(cursor = ?request, "fetching page");
        let page = (state.fetch)(request.clone())
            .await
            .map_err(|e| CatalogError::new(request, e))?;

        state.cursor = match page.next_cursor.filter(|c| !c.is_empty()) {
            None => Cursor::Exhausted,
            Some(next) if !state.seen.insert(next.clone()) => Cursor::Repeated(next),
            Some(next) => Cursor::Next(next),
        };

        Ok(Some((page.items, state)))
    })
    .map_ok(|items| stream::iter(items.into_iter().map(Ok)))
    .try_flatten()
    .boxed()
}
