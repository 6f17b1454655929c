use crate::{AppError, AppResult};

pub const DEFAULT_COUNT: u32 = 25;
pub const MAX_COUNT: u32 = 25;

/// Cuts one page out of `results`.
///
/// Pages start at 1. `count` must be within `1..=MAX_COUNT` and `page` must
/// not run past the last page; an empty result set still has page 1.
pub fn paginate<T>(results: Vec<T>, page: Option<u32>, count: Option<u32>) -> AppResult<Vec<T>> {
    let count = count.unwrap_or(DEFAULT_COUNT) as usize;
    if !(1..=MAX_COUNT as usize).contains(&count) {
        return Err(AppError::BadRequest(format!(
            "Field `count` is out of range; possible values: 1..={MAX_COUNT}"
        )));
    }

    let last_page = results.len().div_ceil(count).max(1);
    let page = page.unwrap_or(1) as usize;
    if !(1..=last_page).contains(&page) {
        return Err(AppError::BadRequest(format!(
            "Field `page` is out of range; possible values: 1..={last_page}"
        )));
    }

    Ok(results.into_iter().skip((page - 1) * count).take(count).collect())
}
