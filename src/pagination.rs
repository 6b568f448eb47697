use tracing::debug;

use crate::error::{ReportError, ReportResult};
use crate::models::Page;

/// Slices `items` into page `page_index` (1-based) of `page_size` items.
///
/// An empty input still forms one empty page. Out-of-range indices are
/// clamped into `[1, total_pages]`, so a stale page number renders the
/// nearest valid page instead of failing.
pub fn paginate<T: Clone>(items: &[T], page_size: usize, page_index: usize) -> ReportResult<Page<T>> {
    if page_size == 0 {
        return Err(ReportError::InvalidPageSize(page_size));
    }

    let total_items = items.len();
    let total_pages = total_items.div_ceil(page_size).max(1);
    let index = page_index.clamp(1, total_pages);
    if index != page_index {
        debug!(requested = page_index, clamped = index, total_pages, "clamped page index");
    }

    let start = ((index - 1) * page_size).min(total_items);
    let end = (start + page_size).min(total_items);

    Ok(Page {
        index,
        page_size,
        items: items[start..end].to_vec(),
        total_pages,
        total_items,
    })
}

/// Every page of `items`, in order.
pub fn pages<T: Clone>(items: &[T], page_size: usize) -> ReportResult<Vec<Page<T>>> {
    let first = paginate(items, page_size, 1)?;
    let total_pages = first.total_pages;
    let mut all = Vec::with_capacity(total_pages);
    all.push(first);
    for index in 2..=total_pages {
        all.push(paginate(items, page_size, index)?);
    }
    Ok(all)
}
