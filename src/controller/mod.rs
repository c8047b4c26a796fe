use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::output;
use crate::pagination::PageState;
use crate::render::{RecordList, RenderedRecord};
use crate::source::{FetchQuery, Record, RecordId, RemoteRecordSource, SourceError};
use crate::tracker::DeletionTracker;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(pub u64);

// hands out increasing tickets; only the newest one may render
#[derive(Clone, Debug, Default)]
pub struct RequestSequence {
    issued: u64,
}

impl RequestSequence {
    pub fn issue(&mut self) -> Ticket {
        self.issued += 1;
        Ticket(self.issued)
    }

    pub fn latest(&self) -> Option<Ticket> {
        if self.issued == 0 {
            None
        } else {
            Some(Ticket(self.issued))
        }
    }

    pub fn is_latest(&self, ticket: Ticket) -> bool {
        self.latest() == Some(ticket)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    pub ticket: Ticket,
    pub query: FetchQuery,
    pub with_count: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fetched {
    pub records: Vec<Record>,
    pub total_count: Option<u64>,
}

#[derive(Debug)]
pub struct Completion {
    pub ticket: Ticket,
    pub outcome: Result<Fetched, SourceError>,
}

#[derive(Debug)]
pub enum Applied {
    Rendered,
    Stale,
    Failed(SourceError),
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("record {id} is not in the visible list")]
    NotVisible { id: RecordId },
}

/// Maps user commands onto the pagination state, the exclusion list and the
/// rendered list.
///
/// Navigation methods mutate state right away and return the request to run;
/// `None` means the command was a no-op. Results come back through
/// [`InputController::apply`].
#[derive(Clone, Debug, Default)]
pub struct InputController {
    page: PageState,
    tracker: DeletionTracker,
    list: RecordList,
    search_text: String,
    sequence: RequestSequence,
}

impl InputController {
    pub fn new(page: PageState) -> Self {
        Self {
            page,
            ..Default::default()
        }
    }

    pub fn page(&self) -> &PageState {
        &self.page
    }

    pub fn tracker(&self) -> &DeletionTracker {
        &self.tracker
    }

    pub fn list(&self) -> &RecordList {
        &self.list
    }

    pub fn search_text(&self) -> &str {
        &self.search_text
    }

    fn issue(&mut self, mut query: FetchQuery, with_count: bool) -> FetchRequest {
        query.exclude = self.tracker.snapshot();
        let request = FetchRequest {
            ticket: self.sequence.issue(),
            query,
            with_count,
        };
        output::debug(format!(
            "request #{} limit={} page={} search={:?} excluded={} count={}",
            request.ticket.0,
            request.query.limit,
            request.query.page,
            request.query.search.as_deref().unwrap_or(""),
            request.query.exclude.len(),
            request.with_count
        ));
        request
    }

    fn current_page_query(&self) -> FetchQuery {
        FetchQuery {
            limit: self.page.page_size(),
            page: self.page.page(),
            ..Default::default()
        }
    }

    // page 1 at the session page size; the cursor is not moved
    fn first_page_query(&self) -> FetchQuery {
        FetchQuery {
            limit: self.page.page_size(),
            page: 1,
            ..Default::default()
        }
    }

    // the total is fetched only while unknown
    pub fn load(&mut self) -> FetchRequest {
        let with_count = self.page.total_count().is_none();
        self.issue(self.first_page_query(), with_count)
    }

    pub fn prev(&mut self) -> Option<FetchRequest> {
        if self.page.is_first_page() {
            return None;
        }
        self.page.prev_page();
        Some(self.issue(self.current_page_query(), false))
    }

    pub fn next(&mut self) -> Option<FetchRequest> {
        if self.page.is_last_page() {
            return None;
        }
        self.page.next_page();
        Some(self.issue(self.current_page_query(), false))
    }

    /// Searches from page 1 at the session page size.
    ///
    /// The page cursor is left where it was, so after a search the shown
    /// page is 1 while `page()` still reports the page navigated to.
    pub fn search(&mut self, text: &str) -> FetchRequest {
        self.search_text = text.to_string();
        let query = FetchQuery {
            search: Some(self.search_text.clone()),
            ..self.first_page_query()
        };
        self.issue(query, false)
    }

    /// Clears the search text, then re-fetches the current page unfiltered.
    ///
    /// With an already empty search text the clearing is skipped but the
    /// re-fetch still happens.
    pub fn reset(&mut self) -> FetchRequest {
        if self.search_text.is_empty() {
            output::debug("search already empty, reset suppressed");
        } else {
            self.search_text.clear();
        }
        self.issue(self.current_page_query(), false)
    }

    /// Soft-deletes a visible record: its id joins the exclusion list and
    /// the unit leaves the list without a re-fetch.
    pub fn delete(&mut self, id: RecordId) -> Result<RenderedRecord, ControllerError> {
        let removed = self
            .list
            .remove(&id)
            .ok_or_else(|| ControllerError::NotVisible { id: id.clone() })?;
        self.tracker.exclude(id);
        Ok(removed)
    }

    /// Applies a finished request.
    ///
    /// A fetched total is stored whatever the ticket; records render only
    /// for the most recently issued ticket.
    pub fn apply(&mut self, completion: Completion) -> Applied {
        let fetched = match completion.outcome {
            Ok(fetched) => fetched,
            Err(e) => return Applied::Failed(e),
        };
        if let Some(total) = fetched.total_count {
            self.page.set_total_count(total);
        }
        if !self.sequence.is_latest(completion.ticket) {
            output::debug(format!(
                "dropping stale response #{} (latest is #{})",
                completion.ticket.0,
                self.sequence.latest().map(|t| t.0).unwrap_or_default()
            ));
            return Applied::Stale;
        }
        self.list.render(fetched.records);
        Applied::Rendered
    }
}

// records first, then the total when asked for; any failure fails the whole request
pub async fn run_request(source: &RemoteRecordSource, request: FetchRequest) -> Completion {
    let outcome = async {
        let records = source.fetch_records(&request.query).await?;
        let total_count = if request.with_count {
            source.get_count().await?
        } else {
            None
        };
        Ok::<_, SourceError>(Fetched {
            records,
            total_count,
        })
    }
    .await;
    Completion {
        ticket: request.ticket,
        outcome,
    }
}

pub fn spawn_request(
    source: RemoteRecordSource,
    request: FetchRequest,
    tx: mpsc::Sender<Completion>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let completion = run_request(&source, request).await;
        if tx.send(completion).await.is_err() {
            output::debug("session closed before a response arrived");
        }
    })
}
