//! Sorting and paging value types.

use super::QueryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Ordering on one property path (`username`, `team.name`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub property: String,
    pub direction: Direction,
}

impl Order {
    pub fn asc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: Direction::Desc,
        }
    }
}

/// Ordered list of `Order`s; empty means store-defined order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sort {
    orders: Vec<Order>,
}

impl Sort {
    pub fn unsorted() -> Self {
        Self::default()
    }

    /// Sorts by each property in turn, all in the same direction.
    pub fn by(direction: Direction, properties: &[&str]) -> Self {
        Self {
            orders: properties
                .iter()
                .map(|property| Order {
                    property: (*property).to_string(),
                    direction,
                })
                .collect(),
        }
    }

    pub fn from_orders(orders: Vec<Order>) -> Self {
        Self { orders }
    }

    /// Appends `other`'s orders after this sort's.
    pub fn and(mut self, other: Sort) -> Self {
        self.orders.extend(other.orders);
        self
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn is_sorted(&self) -> bool {
        !self.orders.is_empty()
    }
}

/// Zero-based page index, page size and sort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    size: u32,
    sort: Sort,
}

impl PageRequest {
    /// # Errors
    /// - `InvalidPageSize` when `size` is zero.
    pub fn of(page: u32, size: u32) -> Result<Self, QueryError> {
        Self::of_sorted(page, size, Sort::unsorted())
    }

    pub fn of_sorted(page: u32, size: u32, sort: Sort) -> Result<Self, QueryError> {
        if size == 0 {
            return Err(QueryError::InvalidPageSize);
        }
        Ok(Self { page, size, sort })
    }

    pub fn page_number(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.size
    }

    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.size)
    }

    pub fn next(&self) -> Self {
        Self {
            page: self.page.saturating_add(1),
            ..self.clone()
        }
    }

    /// Total implied by a short page, sparing the count query.
    ///
    /// A first page shorter than the page size holds everything; a later
    /// non-empty page shorter than the page size is the last one.
    pub(crate) fn infer_total(&self, content_len: usize) -> Option<u64> {
        let len = content_len as u64;
        let size = u64::from(self.size);
        if len >= size {
            return None;
        }
        if self.offset() == 0 {
            return Some(len);
        }
        if len > 0 {
            return Some(self.offset() + len);
        }
        None
    }
}

/// One page of results plus the totals across all pages.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    content: Vec<T>,
    number: u32,
    size: u32,
    total_elements: u64,
}

impl<T> Page<T> {
    pub(crate) fn new(content: Vec<T>, request: &PageRequest, total_elements: u64) -> Self {
        Self {
            content,
            number: request.page,
            size: request.size,
            total_elements,
        }
    }

    pub fn content(&self) -> &[T] {
        &self.content
    }

    /// Zero-based index of this page.
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Requested page size; the content may be shorter.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn number_of_elements(&self) -> usize {
        self.content.len()
    }

    pub fn total_elements(&self) -> u64 {
        self.total_elements
    }

    pub fn total_pages(&self) -> u32 {
        let size = u64::from(self.size.max(1));
        let pages = self.total_elements.div_ceil(size);
        u32::try_from(pages).unwrap_or(u32::MAX)
    }

    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
    }

    pub fn is_first(&self) -> bool {
        !self.has_previous()
    }

    pub fn is_last(&self) -> bool {
        !self.has_next()
    }

    pub fn has_next(&self) -> bool {
        self.number.saturating_add(1) < self.total_pages()
    }

    pub fn has_previous(&self) -> bool {
        self.number > 0
    }

    /// Converts the content while keeping paging metadata.
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            content: self.content.into_iter().map(f).collect(),
            number: self.number,
            size: self.size,
            total_elements: self.total_elements,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Direction, Page, PageRequest, Sort};
    use crate::query::QueryError;

    #[test]
    fn zero_page_size_is_rejected() {
        assert_eq!(PageRequest::of(0, 0), Err(QueryError::InvalidPageSize));
    }

    #[test]
    fn page_metadata_for_first_of_two_pages() {
        let request = PageRequest::of(0, 3).unwrap();
        let page = Page::new(vec!["e", "d", "c"], &request, 5);

        assert_eq!(page.number(), 0);
        assert_eq!(page.number_of_elements(), 3);
        assert_eq!(page.total_pages(), 2);
        assert!(page.is_first());
        assert!(page.has_next());
        assert!(!page.is_last());
    }

    #[test]
    fn last_page_has_no_next() {
        let request = PageRequest::of(1, 3).unwrap();
        let page = Page::new(vec!["b", "a"], &request, 5);

        assert!(page.is_last());
        assert!(page.has_previous());
        assert!(!page.is_first());
    }

    #[test]
    fn empty_result_has_zero_pages() {
        let request = PageRequest::of(0, 10).unwrap();
        let page: Page<u8> = Page::new(Vec::new(), &request, 0);
        assert_eq!(page.total_pages(), 0);
        assert!(!page.has_next());
        assert!(!page.has_content());
    }

    #[test]
    fn map_keeps_metadata() {
        let request = PageRequest::of(0, 2).unwrap();
        let page = Page::new(vec![1, 2], &request, 7).map(|n| n * 10);
        assert_eq!(page.content(), &[10, 20]);
        assert_eq!(page.total_elements(), 7);
        assert_eq!(page.total_pages(), 4);
    }

    #[test]
    fn total_is_inferred_only_from_short_pages() {
        let first = PageRequest::of(0, 3).unwrap();
        assert_eq!(first.infer_total(2), Some(2));
        assert_eq!(first.infer_total(3), None);

        let third = PageRequest::of(2, 3).unwrap();
        assert_eq!(third.infer_total(1), Some(7));
        assert_eq!(third.infer_total(0), None);
    }

    #[test]
    fn next_advances_and_stops_at_last_index() {
        let request = PageRequest::of(1, 3).unwrap();
        assert_eq!(request.next().page_number(), 2);
        assert_eq!(request.next().page_size(), 3);

        let last = PageRequest::of(u32::MAX, 3).unwrap();
        assert_eq!(last.next().page_number(), u32::MAX);
    }

    #[test]
    fn sort_and_appends_orders() {
        let sort = Sort::by(Direction::Desc, &["username"]).and(Sort::by(Direction::Asc, &["age"]));
        assert_eq!(sort.orders().len(), 2);
        assert_eq!(sort.orders()[1].property, "age");
        assert!(!Sort::unsorted().is_sorted());
    }
}
