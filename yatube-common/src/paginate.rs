//! Splitting record lists into numbered pages.
//!
//! A [`Paginator`] resolves a requested page number against a total record
//! count into a [`PageWindow`], which listing queries turn into
//! `LIMIT`/`OFFSET`. The items fetched for that window plus the window itself
//! make up a [`Page`].

use std::num::NonZeroUsize;

pub const DEFAULT_PER_PAGE: NonZeroUsize = NonZeroUsize::new(10).unwrap();

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct Paginator {
    per_page: NonZeroUsize,
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(DEFAULT_PER_PAGE)
    }
}

/// Position of one page inside a paginated list.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PageWindow {
    /// One-based page number.
    pub number: usize,
    pub num_pages: usize,
    pub total_count: usize,
    pub offset: usize,
    pub limit: usize,
}

impl Paginator {
    #[must_use]
    pub fn new(per_page: NonZeroUsize) -> Self {
        Self { per_page }
    }

    #[must_use]
    pub fn per_page(self) -> usize {
        self.per_page.get()
    }

    #[must_use]
    pub fn num_pages(self, total_count: usize) -> usize {
        total_count.div_ceil(self.per_page()).max(1)
    }

    /// Resolves the raw `page` query value.
    ///
    /// Anything that is not an integer yields the first page. Integers outside
    /// of `1..=num_pages` yield the last page.
    #[must_use]
    pub fn window(self, total_count: usize, requested: Option<&str>) -> PageWindow {
        let num_pages = self.num_pages(total_count);

        let number = match requested.map(|raw| raw.trim().parse::<i64>()) {
            None | Some(Err(_)) => 1,
            Some(Ok(number)) => usize::try_from(number)
                .ok()
                .filter(|number| (1..=num_pages).contains(number))
                .unwrap_or(num_pages),
        };

        PageWindow {
            number,
            num_pages,
            total_count,
            offset: (number - 1) * self.per_page(),
            limit: self.per_page(),
        }
    }

    /// Paginates an in-memory list with the same rules as [`Paginator::window`].
    #[must_use]
    pub fn paginate<T>(self, items: Vec<T>, requested: Option<&str>) -> Page<T> {
        let window = self.window(items.len(), requested);
        let items = items
            .into_iter()
            .skip(window.offset)
            .take(window.limit)
            .collect();

        Page::new(items, window)
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Page<T> {
    items: Vec<T>,
    window: PageWindow,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(items: Vec<T>, window: PageWindow) -> Self {
        Self { items, window }
    }

    #[must_use]
    pub fn items(&self) -> &[T] {
        &self.items
    }

    #[must_use]
    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn window(&self) -> PageWindow {
        self.window
    }

    #[must_use]
    pub fn number(&self) -> usize {
        self.window.number
    }

    #[must_use]
    pub fn num_pages(&self) -> usize {
        self.window.num_pages
    }

    #[must_use]
    pub fn total_count(&self) -> usize {
        self.window.total_count
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        self.window.number < self.window.num_pages
    }

    #[must_use]
    pub fn has_previous(&self) -> bool {
        self.window.number > 1
    }

    #[must_use]
    pub fn next_page_number(&self) -> Option<usize> {
        self.has_next().then_some(self.window.number + 1)
    }

    #[must_use]
    pub fn previous_page_number(&self) -> Option<usize> {
        self.has_previous().then_some(self.window.number - 1)
    }
}

impl<'a, T> IntoIterator for &'a Page<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use crate::paginate::{PageWindow, Paginator};
    use std::num::NonZeroUsize;

    fn paginator(per_page: usize) -> Paginator {
        Paginator::new(NonZeroUsize::new(per_page).unwrap())
    }

    #[test]
    fn first_and_second_page_lengths() {
        let records: Vec<u32> = (0..13).collect();

        let first = paginator(10).paginate(records.clone(), None);
        assert_eq!(first.len(), 10);
        assert_eq!(first.items(), &records[..10]);
        assert!(first.has_next());
        assert!(!first.has_previous());
        assert_eq!(first.next_page_number(), Some(2));

        let second = paginator(10).paginate(records.clone(), Some("2"));
        assert_eq!(second.len(), 3);
        assert_eq!(second.items(), &records[10..]);
        assert!(!second.has_next());
        assert_eq!(second.previous_page_number(), Some(1));
        assert_eq!(second.num_pages(), 2);
        assert_eq!(second.total_count(), 13);
    }

    #[test]
    fn fewer_records_than_page_size() {
        let page = paginator(10).paginate(vec!['a', 'b', 'c'], None);
        assert_eq!(page.len(), 3);
        assert_eq!(page.num_pages(), 1);
        assert!(!page.has_next());
    }

    #[test]
    fn empty_list_has_one_empty_page() {
        let page = paginator(10).paginate(Vec::<u8>::new(), Some("3"));
        assert!(page.is_empty());
        assert_eq!(page.number(), 1);
        assert_eq!(page.num_pages(), 1);
    }

    #[test]
    fn requested_page_resolution() {
        let paginator = paginator(10);
        let number = |requested| paginator.window(25, requested).number;

        assert_eq!(number(None), 1);
        assert_eq!(number(Some("")), 1);
        assert_eq!(number(Some("abc")), 1);
        assert_eq!(number(Some("2")), 2);
        assert_eq!(number(Some(" 3 ")), 3);
        assert_eq!(number(Some("4")), 3);
        assert_eq!(number(Some("0")), 3);
        assert_eq!(number(Some("-1")), 3);
    }

    #[test]
    fn window_offsets() {
        assert_eq!(
            paginator(10).window(25, Some("3")),
            PageWindow {
                number: 3,
                num_pages: 3,
                total_count: 25,
                offset: 20,
                limit: 10,
            }
        );
    }
}
