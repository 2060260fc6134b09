// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::columns::{ActionCompletion, CellAction};
use crate::filter::FilterValue;
use crate::ids::RequestId;
use crate::model::{Page, SortDirection, SortSpec};

pub const DEFAULT_PAGE_SIZE: usize = 15;
pub const DEFAULT_PAGE_SIZES: [usize; 5] = [10, 15, 25, 50, 100];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSizes {
    allowed: Vec<usize>,
    default: usize,
}

impl PageSizes {
    pub fn new(allowed: &[usize], default: usize) -> Result<Self> {
        if allowed.is_empty() {
            bail!("page size list must not be empty");
        }
        if allowed.contains(&0) {
            bail!("page sizes must be positive");
        }
        if !allowed.contains(&default) {
            bail!("default page size {default} is not one of {allowed:?}");
        }
        Ok(Self {
            allowed: allowed.to_vec(),
            default,
        })
    }

    pub fn allowed(&self) -> &[usize] {
        &self.allowed
    }

    pub fn default_size(&self) -> usize {
        self.default
    }

    /// `size` when allowed, otherwise the default.
    pub fn resolve(&self, size: usize) -> usize {
        if self.allowed.contains(&size) {
            size
        } else {
            self.default
        }
    }
}

impl Default for PageSizes {
    fn default() -> Self {
        Self {
            allowed: DEFAULT_PAGE_SIZES.to_vec(),
            default: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    pub page_index: usize,
    pub page_size: usize,
    pub sort: SortSpec,
    pub filter: FilterValue,
}

impl ListRequest {
    pub fn first_page(page_size: usize) -> Self {
        Self {
            page_index: 0,
            page_size,
            sort: SortSpec::unsorted(),
            filter: FilterValue::new(),
        }
    }
}

/// A request handed to the fetcher, tagged for staleness checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedRequest {
    pub id: RequestId,
    pub request: ListRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListResult<T> {
    pub items: Vec<T>,
    pub total_count: usize,
    pub request_id: RequestId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListStatus {
    Idle,
    Loading(RequestId),
    Ready,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListCommand {
    SetPage(usize),
    NextPage,
    PrevPage,
    SetPageSize(usize),
    SetSort(SortSpec),
    CycleSort(String),
    SetFilter(FilterValue),
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEvent {
    RequestIssued(IssuedRequest),
    DataReplaced {
        request_id: RequestId,
        total_count: usize,
    },
    Failed {
        request_id: RequestId,
        reason: String,
    },
    SortRejected {
        column: String,
    },
    PageUnavailable {
        page_index: usize,
    },
}

/// Starts a fetch. The outcome comes back later through
/// [`ListController::complete`].
pub trait ListFetcher {
    fn fetch(&mut self, issued: &IssuedRequest);
}

impl<F> ListFetcher for F
where
    F: FnMut(&IssuedRequest),
{
    fn fetch(&mut self, issued: &IssuedRequest) {
        self(issued)
    }
}

type Observer = Box<dyn FnMut(&ListEvent)>;

/// Owns paging, sort and filter state for one list and reconciles fetch
/// completions that may arrive in any order. The highest issued request id
/// always decides what is displayed.
pub struct ListController<T, F> {
    fetcher: F,
    page_sizes: PageSizes,
    sortable: BTreeSet<String>,
    current: ListRequest,
    last_issued: Option<ListRequest>,
    latest_id: Option<RequestId>,
    next_id: RequestId,
    status: ListStatus,
    data: Option<ListResult<T>>,
    // Filter the current `data` was fetched with; its total only bounds
    // paging while that filter is still the current one.
    data_filter: Option<FilterValue>,
    observers: Vec<Observer>,
}

impl<T, F: ListFetcher> ListController<T, F> {
    pub fn new<I, S>(fetcher: F, page_sizes: PageSizes, sortable: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let current = ListRequest::first_page(page_sizes.default_size());
        Self {
            fetcher,
            page_sizes,
            sortable: sortable.into_iter().map(Into::into).collect(),
            current,
            last_issued: None,
            latest_id: None,
            next_id: RequestId::new(1),
            status: ListStatus::Idle,
            data: None,
            data_filter: None,
            observers: Vec::new(),
        }
    }

    /// Replaces the pending request without fetching; the next
    /// [`ListCommand::Refresh`] issues it. Invalid sizes and sorts fall back
    /// to defaults.
    pub fn with_initial_request(mut self, mut request: ListRequest) -> Self {
        request.page_size = self.page_sizes.resolve(request.page_size);
        if request.sort.is_active() && !self.sortable.contains(&request.sort.column) {
            warn!(column = %request.sort.column, "ignoring initial sort on unsortable column");
            request.sort = SortSpec::unsorted();
        }
        self.current = request;
        self
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&ListEvent) + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn request(&self) -> &ListRequest {
        &self.current
    }

    pub fn status(&self) -> &ListStatus {
        &self.status
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.status, ListStatus::Loading(_))
    }

    /// Last good result; kept while a newer request is loading or failed.
    pub fn data(&self) -> Option<&ListResult<T>> {
        self.data.as_ref()
    }

    pub fn rows(&self) -> &[T] {
        self.data.as_ref().map_or(&[], |data| data.items.as_slice())
    }

    pub fn total_count(&self) -> Option<usize> {
        self.data.as_ref().map(|data| data.total_count)
    }

    pub fn page_count(&self) -> Option<usize> {
        self.total_count()
            .map(|total| total.div_ceil(self.current.page_size).max(1))
    }

    pub fn page_sizes(&self) -> &PageSizes {
        &self.page_sizes
    }

    pub fn latest_request_id(&self) -> Option<RequestId> {
        self.latest_id
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn fetcher_mut(&mut self) -> &mut F {
        &mut self.fetcher
    }

    pub fn dispatch(&mut self, command: ListCommand) -> Vec<ListEvent> {
        let events = match command {
            ListCommand::SetPage(page_index) => self.change_page(page_index),
            ListCommand::NextPage => self.change_page(self.current.page_index.saturating_add(1)),
            ListCommand::PrevPage => match self.current.page_index.checked_sub(1) {
                Some(page_index) => self.change_page(page_index),
                None => vec![ListEvent::PageUnavailable { page_index: 0 }],
            },
            ListCommand::SetPageSize(size) => self.change_page_size(size),
            ListCommand::SetSort(sort) => self.change_sort(sort),
            ListCommand::CycleSort(column) => {
                let direction = if self.current.sort.column == column {
                    self.current.sort.direction.cycle()
                } else {
                    SortDirection::Asc
                };
                self.change_sort(SortSpec::new(column, direction))
            }
            ListCommand::SetFilter(filter) => {
                let mut next = self.current.clone();
                if next.filter != filter {
                    next.filter = filter;
                    next.page_index = 0;
                }
                self.issue_if_changed(next)
            }
            ListCommand::Refresh => self.issue(self.current.clone()),
        };
        self.publish(&events);
        events
    }

    /// Applies a fetch outcome. Completions for anything but the most
    /// recently issued request are dropped without events.
    pub fn complete(
        &mut self,
        request_id: RequestId,
        outcome: std::result::Result<Page<T>, String>,
    ) -> Vec<ListEvent> {
        if self.status != ListStatus::Loading(request_id) {
            debug!(
                %request_id,
                latest = ?self.latest_id,
                "discarding superseded list response"
            );
            return Vec::new();
        }

        let events = match outcome {
            Ok(page) => {
                debug!(%request_id, rows = page.items.len(), total = page.count, "list loaded");
                self.data = Some(ListResult {
                    items: page.items,
                    total_count: page.count,
                    request_id,
                });
                self.data_filter = self.last_issued.as_ref().map(|issued| issued.filter.clone());
                self.status = ListStatus::Ready;
                vec![ListEvent::DataReplaced {
                    request_id,
                    total_count: page.count,
                }]
            }
            Err(reason) => {
                warn!(%request_id, %reason, "list request failed");
                self.status = ListStatus::Error(reason.clone());
                vec![ListEvent::Failed { request_id, reason }]
            }
        };
        self.publish(&events);
        events
    }

    /// Re-issues the current request when a cell action asked for it.
    pub fn action_completed(&mut self, action: &CellAction) -> Vec<ListEvent> {
        match action.completion {
            ActionCompletion::Refresh => self.dispatch(ListCommand::Refresh),
            ActionCompletion::FireAndForget => Vec::new(),
        }
    }

    fn change_page(&mut self, page_index: usize) -> Vec<ListEvent> {
        let total_is_current = self.data_filter.as_ref() == Some(&self.current.filter);
        if total_is_current
            && let Some(pages) = self.page_count()
            && page_index >= pages
        {
            return vec![ListEvent::PageUnavailable { page_index }];
        }
        let mut next = self.current.clone();
        next.page_index = page_index;
        self.issue_if_changed(next)
    }

    fn change_page_size(&mut self, size: usize) -> Vec<ListEvent> {
        let size = self.page_sizes.resolve(size);
        let mut next = self.current.clone();
        next.page_size = size;
        let still_exists = match self.total_count() {
            Some(total) => next.page_index.saturating_mul(size) < total,
            None => false,
        };
        if !still_exists {
            next.page_index = 0;
        }
        self.issue_if_changed(next)
    }

    fn change_sort(&mut self, sort: SortSpec) -> Vec<ListEvent> {
        if sort.is_active() && !self.sortable.contains(&sort.column) {
            return vec![ListEvent::SortRejected {
                column: sort.column,
            }];
        }
        let mut next = self.current.clone();
        if next.sort != sort {
            next.sort = sort;
            next.page_index = 0;
        }
        self.issue_if_changed(next)
    }

    fn issue_if_changed(&mut self, next: ListRequest) -> Vec<ListEvent> {
        if self.last_issued.as_ref() == Some(&next) {
            return Vec::new();
        }
        self.issue(next)
    }

    fn issue(&mut self, request: ListRequest) -> Vec<ListEvent> {
        let id = self.next_id;
        self.next_id = id.next();
        self.current = request.clone();
        self.last_issued = Some(request.clone());
        self.latest_id = Some(id);
        self.status = ListStatus::Loading(id);

        let issued = IssuedRequest { id, request };
        debug!(
            request_id = %id,
            page = issued.request.page_index,
            page_size = issued.request.page_size,
            "issuing list request"
        );
        self.fetcher.fetch(&issued);
        vec![ListEvent::RequestIssued(issued)]
    }

    fn publish(&mut self, events: &[ListEvent]) {
        for observer in &mut self.observers {
            for event in events {
                observer(event);
            }
        }
    }
}
