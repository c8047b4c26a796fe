pub const DEFAULT_PAGE_SIZE: u64 = 10;

// whether the current page is the last one, with the unknown-total case kept explicit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LastPage {
    Unknown,
    Last,
    NotLast,
}

// the pagination cursor shared by every command handler of a session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageState {
    page: u64,
    page_size: u64,
    total_count: Option<u64>,
}

impl Default for PageState {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl PageState {
    /// Creates a cursor on page 1 with an unknown total.
    ///
    /// A zero page size is clamped to 1 so the last-page arithmetic stays defined.
    pub fn new(page_size: u64) -> Self {
        Self {
            page: 1,
            page_size: page_size.max(1),
            total_count: None,
        }
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn total_count(&self) -> Option<u64> {
        self.total_count
    }

    pub fn set_total_count(&mut self, total_count: u64) {
        self.total_count = Some(total_count);
    }

    /// Advances one page and returns the new page number.
    ///
    /// There is no upper bound here: callers check [`PageState::is_last_page`]
    /// before advancing.
    pub fn next_page(&mut self) -> u64 {
        self.page += 1;
        self.page
    }

    /// Steps back one page, staying on page 1 when already there.
    pub fn prev_page(&mut self) -> u64 {
        if self.page != 1 {
            self.page -= 1;
        }
        self.page
    }

    pub fn is_first_page(&self) -> bool {
        self.page == 1
    }

    /// Number of the last page, `ceil(total / page_size)`, once the total is known.
    pub fn last_page(&self) -> Option<u64> {
        self.total_count
            .map(|total| total.div_ceil(self.page_size))
    }

    pub fn last_page_status(&self) -> LastPage {
        match self.last_page() {
            None => LastPage::Unknown,
            Some(last) if last == self.page => LastPage::Last,
            Some(_) => LastPage::NotLast,
        }
    }

    /// An unknown total counts as "more pages exist".
    pub fn is_last_page(&self) -> bool {
        self.last_page_status() == LastPage::Last
    }
}
