// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use serde_json::Value;
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;
use time::OffsetDateTime;
use time::macros::format_description;
use tokenadmin_app::{
    CellAction, ChallengeRow, ContainerRow, EnrollForm, EnrollParams, FilterInput, IssuedRequest,
    ListCommand, ListController, ListEvent, ListFetcher, ListRequest, ListRow, ListStatus,
    MachineTokenRow, Page, PageSizes, QueryParams, RequestId, RowClass, SortDirection, SortSpec,
    TokenRow, TokenTypeRegistry, ViewKind,
};
use tokenadmin_client::{Client, EnrollResponse};
use tracing::{debug, info, warn};

const PROMPT: &str = "tokenadmin> ";

/// Server calls the runtime makes. Implemented by the HTTP client.
pub trait Backend: Send + Sync {
    fn fetch_raw_page(&self, view: ViewKind, params: &QueryParams) -> Result<Page<Value>>;
    fn perform(&self, action: &CellAction) -> Result<Value>;
    fn enroll_token(&self, params: &EnrollParams) -> Result<EnrollResponse>;
}

impl Backend for Client {
    fn fetch_raw_page(&self, view: ViewKind, params: &QueryParams) -> Result<Page<Value>> {
        Client::fetch_raw_page(self, view, params)
    }

    fn perform(&self, action: &CellAction) -> Result<Value> {
        Client::perform(self, action)
    }

    fn enroll_token(&self, params: &EnrollParams) -> Result<EnrollResponse> {
        Client::enroll_token(self, params)
    }
}

#[derive(Debug)]
pub enum InternalEvent {
    ListFetched {
        view: ViewKind,
        request_id: RequestId,
        outcome: Result<Page<Value>, String>,
    },
}

/// Runs each fetch on its own worker thread and reports back over the
/// event channel.
pub struct ThreadFetcher {
    backend: Arc<dyn Backend>,
    view: ViewKind,
    tx: Sender<InternalEvent>,
}

impl ListFetcher for ThreadFetcher {
    fn fetch(&mut self, issued: &IssuedRequest) {
        let params = issued.request.to_query(&self.view.classification());
        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        let view = self.view;
        let request_id = issued.id;
        debug!(%request_id, view = view.as_str(), "fetch started");

        thread::spawn(move || {
            let outcome = backend
                .fetch_raw_page(view, &params)
                .map_err(|error| format!("{error:#}"));
            if tx
                .send(InternalEvent::ListFetched {
                    view,
                    request_id,
                    outcome,
                })
                .is_err()
            {
                debug!(%request_id, "runtime gone before fetch finished");
            }
        });
    }
}

/// What activating a cell leads to.
#[derive(Debug, Clone, PartialEq)]
pub enum Activation {
    Action(CellAction),
    Route(String),
}

trait ViewSession {
    fn view(&self) -> ViewKind;
    fn filter(&mut self) -> &mut FilterInput;
    fn dispatch(&mut self, command: ListCommand) -> Vec<ListEvent>;
    fn complete(
        &mut self,
        request_id: RequestId,
        outcome: Result<Page<Value>, String>,
    ) -> Vec<ListEvent>;
    fn action_completed(&mut self, action: &CellAction) -> Vec<ListEvent>;
    fn is_loading(&self) -> bool;
    fn status(&self) -> &ListStatus;
    fn activate(&self, row: usize, column: &str) -> Result<Activation>;
    fn render(&self) -> String;
}

struct ListSession<T> {
    controller: ListController<T, ThreadFetcher>,
    input: FilterInput,
    refreshed_at: Option<OffsetDateTime>,
}

impl<T: ListRow> ListSession<T> {
    fn new(
        fetcher: ThreadFetcher,
        page_sizes: PageSizes,
        filter_text: &str,
        mut request: ListRequest,
    ) -> Self {
        let mut input = FilterInput::new(&T::VIEW.keywords());
        input.set_text(filter_text);
        request.filter = input.value();
        let controller = ListController::new(fetcher, page_sizes, T::sortable_keys())
            .with_initial_request(request);
        Self {
            controller,
            input,
            refreshed_at: None,
        }
    }
}

impl<T: ListRow + 'static> ViewSession for ListSession<T> {
    fn view(&self) -> ViewKind {
        T::VIEW
    }

    fn filter(&mut self) -> &mut FilterInput {
        &mut self.input
    }

    fn dispatch(&mut self, command: ListCommand) -> Vec<ListEvent> {
        self.controller.dispatch(command)
    }

    fn complete(
        &mut self,
        request_id: RequestId,
        outcome: Result<Page<Value>, String>,
    ) -> Vec<ListEvent> {
        let decoded = outcome.and_then(|page| {
            page.try_map(serde_json::from_value::<T>)
                .map_err(|error| format!("decode {} rows: {error}", T::VIEW.label()))
        });
        let events = self.controller.complete(request_id, decoded);
        if events
            .iter()
            .any(|event| matches!(event, ListEvent::DataReplaced { .. }))
        {
            self.refreshed_at = Some(OffsetDateTime::now_utc());
        }
        events
    }

    fn action_completed(&mut self, action: &CellAction) -> Vec<ListEvent> {
        self.controller.action_completed(action)
    }

    fn is_loading(&self) -> bool {
        self.controller.is_loading()
    }

    fn status(&self) -> &ListStatus {
        self.controller.status()
    }

    fn activate(&self, row: usize, column: &str) -> Result<Activation> {
        let item = row
            .checked_sub(1)
            .and_then(|index| self.controller.rows().get(index))
            .ok_or_else(|| anyhow!("no row {row} on this page; rows are numbered from 1"))?;
        let found = T::find_column(column)
            .ok_or_else(|| anyhow!("{} have no column {column:?}", T::VIEW.label()))?;

        if let Some(route) = found.route(item) {
            return Ok(Activation::Route(route));
        }
        found
            .activate(item)
            .map(Activation::Action)
            .ok_or_else(|| anyhow!("column {:?} has nothing to do for row {row}", found.key))
    }

    fn render(&self) -> String {
        let mut out = render_table(self.controller.rows());
        out.push_str(&status_line(T::VIEW, &self.controller, self.refreshed_at));
        out
    }
}

/// Renders rows as an aligned text table. Multi-line cells grow the row;
/// the `#` column carries the 1-based row number and a `-` (muted) or `!`
/// (alert) marker.
pub fn render_table<T: ListRow>(rows: &[T]) -> String {
    if rows.is_empty() {
        return format!("no {} to show\n", T::VIEW.label());
    }

    let columns = T::columns();
    let mut headers = vec!["#".to_owned()];
    headers.extend(columns.iter().map(|column| column.label.to_owned()));

    let grid: Vec<Vec<Vec<String>>> = rows
        .iter()
        .enumerate()
        .map(|(index, row)| {
            let class = columns
                .iter()
                .map(|column| column.row_class(row))
                .find(|class| *class != RowClass::Normal)
                .unwrap_or(RowClass::Normal);
            let marker = match class {
                RowClass::Normal => "",
                RowClass::Muted => "-",
                RowClass::Alert => "!",
            };
            let mut cells = vec![vec![format!("{}{marker}", index + 1)]];
            cells.extend(columns.iter().map(|column| column.display_items(row)));
            cells
        })
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|header| header.chars().count()).collect();
    for cells in &grid {
        for (width, cell) in widths.iter_mut().zip(cells) {
            for line in cell {
                *width = (*width).max(line.chars().count());
            }
        }
    }

    let rules: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    let mut out = String::new();
    push_line(&mut out, &widths, headers.iter().map(String::as_str));
    push_line(&mut out, &widths, rules.iter().map(String::as_str));
    for cells in &grid {
        let height = cells.iter().map(Vec::len).max().unwrap_or(1).max(1);
        for line in 0..height {
            push_line(
                &mut out,
                &widths,
                cells
                    .iter()
                    .map(|cell| cell.get(line).map_or("", String::as_str)),
            );
        }
    }
    out
}

fn push_line<'a>(out: &mut String, widths: &[usize], cells: impl Iterator<Item = &'a str>) {
    let line = widths
        .iter()
        .zip(cells)
        .map(|(width, cell)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    out.push_str(line.trim_end());
    out.push('\n');
}

fn status_line<T, F: ListFetcher>(
    view: ViewKind,
    controller: &ListController<T, F>,
    refreshed_at: Option<OffsetDateTime>,
) -> String {
    let request = controller.request();
    let mut parts = vec![view.label().to_owned()];
    match (controller.page_count(), controller.total_count()) {
        (Some(pages), Some(total)) => {
            parts.push(format!("page {}/{pages}", request.page_index + 1));
            parts.push(format!("{total} total"));
        }
        _ => parts.push(format!("page {}", request.page_index + 1)),
    }
    parts.push(format!("{} per page", request.page_size));
    if request.sort.is_active() {
        parts.push(format!(
            "sort {} {}",
            request.sort.column,
            request.sort.direction.as_str()
        ));
    }
    if !request.filter.is_empty() {
        parts.push(format!("filter {:?}", request.filter.compose()));
    }
    match controller.status() {
        ListStatus::Loading(_) => parts.push("loading".to_owned()),
        ListStatus::Error(reason) => parts.push(format!("error: {reason}")),
        ListStatus::Idle | ListStatus::Ready => {}
    }
    if let Some(at) = refreshed_at {
        parts.push(format!("refreshed at {}", format_clock(at)));
    }
    format!("{}\n", parts.join(" | "))
}

fn format_clock(at: OffsetDateTime) -> String {
    at.format(format_description!("[hour]:[minute]:[second] UTC"))
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Filter(String),
    Toggle(String),
    ClearFilter,
    Keywords,
    Page(usize),
    Next,
    Prev,
    Size(usize),
    Sort {
        column: String,
        direction: Option<SortDirection>,
    },
    Refresh,
    View(ViewKind),
    Open {
        row: usize,
        column: String,
    },
    Enroll {
        token_type: String,
        fields: Vec<(String, String)>,
    },
    Show,
    Help,
    Quit,
}

impl ShellCommand {
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let (name, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(name, rest)| (name, rest.trim()));

        let command = match name.to_ascii_lowercase().as_str() {
            "filter" | "f" => Self::Filter(rest.to_owned()),
            "toggle" | "t" | "bool" => Self::Toggle(required(rest, "toggle <keyword>")?.to_owned()),
            "clear" => Self::ClearFilter,
            "keywords" | "k" => Self::Keywords,
            "page" | "p" => Self::Page(parse_count(rest, "page")?),
            "next" | "n" => Self::Next,
            "prev" => Self::Prev,
            "size" => Self::Size(parse_count(rest, "size")?),
            "sort" | "s" => {
                let mut words = required(rest, "sort <column> [asc|desc|none]")?.split_whitespace();
                let column = words.next().unwrap_or_default().to_owned();
                let direction = words
                    .next()
                    .map(|word| {
                        SortDirection::parse(word).ok_or_else(|| {
                            anyhow!("unknown sort direction {word:?}; use asc, desc or none")
                        })
                    })
                    .transpose()?;
                Self::Sort { column, direction }
            }
            "refresh" | "r" => Self::Refresh,
            "view" | "v" => Self::View(ViewKind::parse(rest).ok_or_else(|| {
                anyhow!("unknown view {rest:?}; use tokens, containers, machines or challenges")
            })?),
            "open" | "o" | "activate" => {
                let usage = "open <row> <column>";
                let (row, column) = required(rest, usage)?
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| anyhow!("usage: {usage}"))?;
                Self::Open {
                    row: parse_count(row, "row")?,
                    column: column.trim().to_owned(),
                }
            }
            "enroll" | "e" => {
                let mut words = required(rest, "enroll <type> [key=value ...]")?.split_whitespace();
                let token_type = words.next().unwrap_or_default().to_owned();
                let fields = words
                    .map(|word| {
                        word.split_once('=')
                            .map(|(key, value)| (key.to_owned(), value.to_owned()))
                            .ok_or_else(|| anyhow!("expected key=value, got {word:?}"))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Self::Enroll { token_type, fields }
            }
            "show" | "ls" => Self::Show,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => bail!("unknown command {other:?}; type `help` for the command list"),
        };
        Ok(command)
    }
}

fn required<'a>(rest: &'a str, usage: &str) -> Result<&'a str> {
    if rest.is_empty() {
        bail!("usage: {usage}");
    }
    Ok(rest)
}

fn parse_count(raw: &str, what: &str) -> Result<usize> {
    let value: usize = raw
        .trim()
        .parse()
        .with_context(|| format!("{what} must be a number, got {raw:?}"))?;
    if value == 0 {
        bail!("{what} counts from 1");
    }
    Ok(value)
}

const HELP: &str = "\
commands:
  filter <text>                 replace the filter, e.g. `filter serial: oath active: true`
  toggle <keyword>              add or remove a filter keyword (booleans cycle true, false, off)
  clear                         remove the filter
  keywords                      list filter keywords of this view
  page <n> | next | prev        move between pages
  size <n>                      change the page size
  sort <column> [asc|desc|none] sort, or cycle the direction when none is given
  refresh                       fetch the current page again
  view <name>                   switch to tokens, containers, machines or challenges
  open <row> <column>           follow a link or run the action of a cell
  enroll <type> [key=value ...] enroll a token, e.g. `enroll totp user=alice genkey=1`
  show                          print the current page
  quit
";

pub enum Reply {
    Output(String),
    Quit,
}

/// Holds one list session per opened view and routes fetch results back to
/// them.
pub struct Shell {
    backend: Arc<dyn Backend>,
    page_sizes: PageSizes,
    registry: TokenTypeRegistry,
    wait: Duration,
    tx: Sender<InternalEvent>,
    rx: Receiver<InternalEvent>,
    sessions: Vec<Box<dyn ViewSession>>,
    active: usize,
}

impl Shell {
    /// `wait` bounds how long a command blocks for its fetch to finish.
    pub fn new(backend: Arc<dyn Backend>, page_sizes: PageSizes, wait: Duration) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            backend,
            page_sizes,
            registry: TokenTypeRegistry::with_builtin_types(),
            wait,
            tx,
            rx,
            sessions: Vec::new(),
            active: 0,
        }
    }

    /// Switches to `view`, creating its session and issuing the first fetch
    /// when it was not open yet.
    pub fn open_view(&mut self, view: ViewKind, filter_text: &str, request: ListRequest) {
        if let Some(index) = self.sessions.iter().position(|session| session.view() == view) {
            self.active = index;
            return;
        }

        let fetcher = ThreadFetcher {
            backend: Arc::clone(&self.backend),
            view,
            tx: self.tx.clone(),
        };
        let page_sizes = self.page_sizes.clone();
        let mut session: Box<dyn ViewSession> = match view {
            ViewKind::Tokens => Box::new(ListSession::<TokenRow>::new(
                fetcher,
                page_sizes,
                filter_text,
                request,
            )),
            ViewKind::Containers => Box::new(ListSession::<ContainerRow>::new(
                fetcher,
                page_sizes,
                filter_text,
                request,
            )),
            ViewKind::MachineTokens => Box::new(ListSession::<MachineTokenRow>::new(
                fetcher,
                page_sizes,
                filter_text,
                request,
            )),
            ViewKind::Challenges => Box::new(ListSession::<ChallengeRow>::new(
                fetcher,
                page_sizes,
                filter_text,
                request,
            )),
        };
        session.dispatch(ListCommand::Refresh);
        self.sessions.push(session);
        self.active = self.sessions.len() - 1;
    }

    /// Loads one page and returns it rendered.
    pub fn fetch_once(
        &mut self,
        view: ViewKind,
        filter_text: &str,
        request: ListRequest,
    ) -> Result<String> {
        self.open_view(view, filter_text, request);
        self.settle()?;
        let session = self.active()?;
        if let ListStatus::Error(reason) = session.status() {
            bail!("load {}: {reason}", view.label());
        }
        Ok(session.render())
    }

    pub fn render(&self) -> Result<String> {
        Ok(self.active()?.render())
    }

    pub fn execute(&mut self, command: ShellCommand) -> Result<Reply> {
        let output = match command {
            ShellCommand::Quit => return Ok(Reply::Quit),
            ShellCommand::Help => HELP.to_owned(),
            ShellCommand::Show => self.render()?,
            ShellCommand::Keywords => {
                let session = self.active_mut()?;
                let vocabulary = session.filter().vocabulary();
                let keys: Vec<String> = vocabulary
                    .keys()
                    .map(|key| match vocabulary.label_for(key) {
                        Some(label) if label != key => format!("{key} ({label}:)"),
                        _ => key.to_owned(),
                    })
                    .chain(vocabulary.aliases().map(str::to_owned))
                    .collect();
                format!("{}\n", keys.join(", "))
            }
            ShellCommand::Filter(text) => {
                let session = self.active_mut()?;
                session.filter().set_text(&text);
                let value = session.filter().value();
                self.run_list_command(ListCommand::SetFilter(value))?
            }
            ShellCommand::ClearFilter => {
                let session = self.active_mut()?;
                session.filter().clear();
                let value = session.filter().value();
                self.run_list_command(ListCommand::SetFilter(value))?
            }
            ShellCommand::Toggle(key) => {
                let session = self.active_mut()?;
                if !session.filter().vocabulary().accepts(&key) {
                    bail!("unknown filter keyword {key:?}; `keywords` lists them");
                }
                let text = session.filter().toggle(&key).to_owned();
                let value = session.filter().value();
                let mut out = format!("filter: {text}\n");
                out.push_str(&self.run_list_command(ListCommand::SetFilter(value))?);
                out
            }
            ShellCommand::Page(0) => bail!("page counts from 1"),
            ShellCommand::Page(page) => self.run_list_command(ListCommand::SetPage(page - 1))?,
            ShellCommand::Next => self.run_list_command(ListCommand::NextPage)?,
            ShellCommand::Prev => self.run_list_command(ListCommand::PrevPage)?,
            ShellCommand::Size(size) => {
                if !self.page_sizes.allowed().contains(&size) {
                    bail!(
                        "page size {size} is not allowed; choose one of {:?}",
                        self.page_sizes.allowed()
                    );
                }
                self.run_list_command(ListCommand::SetPageSize(size))?
            }
            ShellCommand::Sort { column, direction } => {
                let command = match direction {
                    Some(direction) => ListCommand::SetSort(SortSpec::new(column, direction)),
                    None => ListCommand::CycleSort(column),
                };
                self.run_list_command(command)?
            }
            ShellCommand::Refresh => self.run_list_command(ListCommand::Refresh)?,
            ShellCommand::View(view) => {
                let request = ListRequest::first_page(self.page_sizes.default_size());
                self.open_view(view, "", request);
                self.settle()?;
                self.render()?
            }
            ShellCommand::Open { row, column } => self.open_cell(row, &column)?,
            ShellCommand::Enroll { token_type, fields } => self.enroll(&token_type, &fields)?,
        };
        Ok(Reply::Output(output))
    }

    /// Blocks until the active view has its latest response, applying
    /// whatever arrives for other views along the way.
    pub fn settle(&mut self) -> Result<()> {
        self.process_internal_events();
        while self
            .sessions
            .get(self.active)
            .is_some_and(|session| session.is_loading())
        {
            match self.rx.recv_timeout(self.wait) {
                Ok(event) => self.handle_internal_event(event),
                Err(RecvTimeoutError::Timeout) => bail!(
                    "no response within {:?}; raise [server].timeout or check the server",
                    self.wait
                ),
                Err(RecvTimeoutError::Disconnected) => bail!("fetch workers disconnected"),
            }
        }
        Ok(())
    }

    fn process_internal_events(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            self.handle_internal_event(event);
        }
    }

    fn handle_internal_event(&mut self, event: InternalEvent) {
        match event {
            InternalEvent::ListFetched {
                view,
                request_id,
                outcome,
            } => match self
                .sessions
                .iter_mut()
                .find(|session| session.view() == view)
            {
                Some(session) => {
                    session.complete(request_id, outcome);
                }
                None => debug!(view = view.as_str(), "response for a closed view"),
            },
        }
    }

    fn active(&self) -> Result<&dyn ViewSession> {
        self.sessions
            .get(self.active)
            .map(|session| &**session)
            .ok_or_else(|| anyhow!("no view open; run `view tokens` first"))
    }

    fn active_mut(&mut self) -> Result<&mut (dyn ViewSession + 'static)> {
        self.sessions
            .get_mut(self.active)
            .map(|session| &mut **session)
            .ok_or_else(|| anyhow!("no view open; run `view tokens` first"))
    }

    fn run_list_command(&mut self, command: ListCommand) -> Result<String> {
        let events = self.active_mut()?.dispatch(command.clone());
        let mut out = String::new();
        for note in events.iter().filter_map(|event| describe_event(&command, event)) {
            out.push_str(&note);
            out.push('\n');
        }
        self.settle()?;
        out.push_str(&self.render()?);
        Ok(out)
    }

    fn open_cell(&mut self, row: usize, column: &str) -> Result<String> {
        match self.active()?.activate(row, column)? {
            Activation::Route(route) => Ok(format!("open {route}\n")),
            Activation::Action(action) => {
                info!(
                    method = action.method.as_str(),
                    path = %action.path,
                    "running cell action"
                );
                self.backend
                    .perform(&action)
                    .with_context(|| format!("{} failed", action.description))?;
                let mut out = format!("{}: done\n", action.description);
                self.active_mut()?.action_completed(&action);
                self.settle()?;
                out.push_str(&self.render()?);
                Ok(out)
            }
        }
    }

    fn enroll(&mut self, token_type: &str, fields: &[(String, String)]) -> Result<String> {
        let form = EnrollForm::from_pairs(
            fields
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_str())),
        );
        let params = self.registry.enroll(token_type, &form)?;
        let response = self.backend.enroll_token(&params)?;
        info!(serial = %response.serial, token_type, "token enrolled");

        let mut out = format!("enrolled {}\n", response.serial);
        if let Some(url) = &response.otpauth_url {
            out.push_str(&format!("provisioning url: {url}\n"));
        }
        if let Some(tokens) = self
            .sessions
            .iter_mut()
            .find(|session| session.view() == ViewKind::Tokens)
        {
            tokens.dispatch(ListCommand::Refresh);
        }
        Ok(out)
    }
}

fn describe_event(command: &ListCommand, event: &ListEvent) -> Option<String> {
    match event {
        ListEvent::SortRejected { column } => Some(format!("column {column:?} is not sortable")),
        ListEvent::PageUnavailable { .. } if matches!(command, ListCommand::PrevPage) => {
            Some("already on the first page".to_owned())
        }
        ListEvent::PageUnavailable { page_index } => {
            Some(format!("there is no page {}", page_index + 1))
        }
        _ => None,
    }
}

/// Reads commands line by line until `quit` or end of input.
pub fn run_shell<R: BufRead, W: Write>(
    shell: &mut Shell,
    mut input: R,
    mut output: W,
) -> Result<()> {
    shell.settle()?;
    write!(output, "{}", shell.render()?)?;

    let mut line = String::new();
    loop {
        write!(output, "{PROMPT}")?;
        output.flush()?;
        line.clear();
        if input.read_line(&mut line).context("read command")? == 0 {
            writeln!(output)?;
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        let reply = ShellCommand::parse(&line).and_then(|command| shell.execute(command));
        match reply {
            Ok(Reply::Quit) => break,
            Ok(Reply::Output(text)) => write!(output, "{text}")?,
            Err(error) => {
                warn!(command = line.trim(), "command failed: {error:#}");
                writeln!(output, "error: {error:#}")?;
            }
        }
    }
    output.flush()?;
    Ok(())
}
