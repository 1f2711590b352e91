//! Cursor arithmetic between day offsets, logical pages and remote pages.

use color_eyre::{eyre::eyre, Result};

/// Map a logical page onto a remote page.
///
/// Logical pages inside the known range (or any page while the total is still
/// unknown) are requested as-is. Beyond it they wrap around; there is no page
/// 0, so an exact multiple of the total maps to the last page.
pub fn resolve_remote_page(logical: u32, total_pages: u32) -> Result<u32> {
  if logical == 0 {
    return Err(eyre!("Logical page 0 requested; pages start at 1"));
  }

  if total_pages == 0 || logical <= total_pages {
    return Ok(logical);
  }

  match logical % total_pages {
    0 => Ok(total_pages),
    wrapped => Ok(wrapped),
  }
}

/// Logical page containing `offset`.
pub fn page_containing(offset: i64, page_size: u32) -> Result<u32> {
  check_page_size(page_size)?;
  if offset < 0 {
    return Err(eyre!("Day offset {} is before the epoch", offset));
  }
  to_page(offset / i64::from(page_size) + 1)
}

/// First logical page that has not been started by days before `next_offset`.
///
/// For a page-aligned cursor this is the page containing `next_offset`; a
/// cursor inside a page (left there by dedup compaction) moves on to the next.
pub fn page_after(next_offset: i64, page_size: u32) -> Result<u32> {
  check_page_size(page_size)?;
  if next_offset < 0 {
    return Err(eyre!("Day offset {} is before the epoch", next_offset));
  }
  let size = i64::from(page_size);
  to_page((next_offset + size - 1) / size + 1)
}

/// First day offset of a logical page.
pub fn page_start(logical: u32, page_size: u32) -> i64 {
  (i64::from(logical) - 1) * i64::from(page_size)
}

fn check_page_size(page_size: u32) -> Result<()> {
  if page_size == 0 {
    return Err(eyre!("Page size must be at least 1"));
  }
  Ok(())
}

fn to_page(page: i64) -> Result<u32> {
  u32::try_from(page).map_err(|_| eyre!("Logical page {} is out of range", page))
}
