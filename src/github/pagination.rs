//! Cursor pagination over GraphQL connections

use std::future::Future;

use tracing::{trace, warn};

use super::types::Connection;
use crate::error::TransportError;

/// Fetch every page of a connection
///
/// `fetch` receives the `after` cursor (`None` for the first page) and returns
/// one page. Pages are requested strictly one after another; nodes are
/// concatenated in request order and `null` nodes are dropped.
pub async fn paginate<T, F, Fut>(mut fetch: F) -> Result<Vec<T>, TransportError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Connection<T>, TransportError>>,
{
    let mut nodes = Vec::new();
    let mut cursor: Option<String> = None;
    let mut page = 0usize;

    loop {
        let connection = fetch(cursor.take()).await?;
        page += 1;
        trace!(page, count = connection.nodes.len(), "fetched connection page");
        nodes.extend(connection.nodes.into_iter().flatten());

        if !connection.page_info.has_next_page {
            break;
        }
        match connection.page_info.end_cursor {
            Some(next) => cursor = Some(next),
            None => {
                warn!(page, "connection reported another page without a cursor, stopping");
                break;
            }
        }
    }

    Ok(nodes)
}
