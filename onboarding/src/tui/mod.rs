//! Headless terminal registration wizard.
//!
//! Layout:
//! - Centered window titled "Cooperative Registration"
//! - Left panel with the step list
//! - Main panel with the current page's fields
//! - Bottom button row: [ Back ] [ Next ] [ Cancel ]
//! - Modals for alerts, cancel confirmation and retry/cancel after provider failures
//!
//! Network calls run on short-lived worker threads (one current-thread runtime each) and report
//! back over a channel; the UI thread only ever mutates state in `apply_message`.
//! Logging is file-only in this mode so the terminal is not corrupted.

use crate::error::{ClientError, ClientResult};
use crate::models::requests::RegistrationRole;
use crate::models::responses::LocationOption;
use crate::session::{SessionContext, SessionData};
use crate::smoke;
use crate::wizard::cascade::{CascadeLevel, LocationDirectory, PendingFetch};
use crate::wizard::form::fields;
use crate::wizard::gate::WizardTab;
use crate::wizard::submission::{
    self, CheckoutDefaults, CheckoutGateway, CheckoutHandle, NextStep, PaymentOutcome,
    RegistrationApi, RegistrationReceipt, SecondaryOutcome,
};
use crate::wizard::verification::{
    self, BankValidationError, BankValidationGateway, BankValidationReceipt,
};
use crate::wizard::Wizard;
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use log::{error, info, warn};
use ratatui::backend::{CrosstermBackend, TestBackend};
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Terminal;
use std::collections::HashMap;
use std::future::Future;
use std::io::{self, Stdout};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Collaborators the wizard talks to. Payment processor pieces are optional: without
/// credentials the bank tab cannot be validated and fees cannot be paid.
#[derive(Clone)]
pub struct Services {
    pub directory: Arc<dyn LocationDirectory>,
    pub registration: Arc<dyn RegistrationApi>,
    pub bank_validation: Option<Arc<dyn BankValidationGateway>>,
    pub checkout: Option<Arc<dyn CheckoutGateway>>,
    pub sessions: Arc<SessionContext>,
    pub checkout_defaults: CheckoutDefaults,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Page {
    Welcome,
    Personal,
    Documents,
    Bank,
    Details,
    Payment,
    Complete,
}

impl Page {
    fn from_tab(tab: WizardTab) -> Self {
        match tab {
            WizardTab::Personal => Page::Personal,
            WizardTab::Documents => Page::Documents,
            WizardTab::Bank => Page::Bank,
            WizardTab::Details => Page::Details,
        }
    }

    fn tab(self) -> Option<WizardTab> {
        match self {
            Page::Personal => Some(WizardTab::Personal),
            Page::Documents => Some(WizardTab::Documents),
            Page::Bank => Some(WizardTab::Bank),
            Page::Details => Some(WizardTab::Details),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ButtonFocus {
    Back,
    Next,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FocusTarget {
    Field(usize),
    Button(ButtonFocus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryAction {
    ValidateBank,
    Payment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Modal {
    ConfirmCancel,
    Message { title: String, body: String },
    RetryCancel {
        title: String,
        body: String,
        action: RetryAction,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldSpec {
    Text {
        field: &'static str,
        label: &'static str,
    },
    Location(CascadeLevel),
    ValidateBank,
}

#[derive(Debug, Clone, Default)]
struct TextInput {
    value: String,
    /// Cursor position in chars.
    cursor: usize,
}

impl TextInput {
    fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            cursor: value.chars().count(),
            value,
        }
    }

    fn set(&mut self, value: impl Into<String>) {
        self.value = value.into();
        self.cursor = self.value.chars().count();
    }

    fn byte_index(&self, char_index: usize) -> usize {
        self.value
            .char_indices()
            .nth(char_index)
            .map(|(i, _)| i)
            .unwrap_or(self.value.len())
    }

    fn len(&self) -> usize {
        self.value.chars().count()
    }

    /// Returns true when the value changed.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char(c) => {
                let at = self.byte_index(self.cursor);
                self.value.insert(at, c);
                self.cursor += 1;
                true
            }
            KeyCode::Backspace => {
                if self.cursor == 0 {
                    return false;
                }
                let at = self.byte_index(self.cursor - 1);
                self.value.remove(at);
                self.cursor -= 1;
                true
            }
            KeyCode::Delete => {
                if self.cursor >= self.len() {
                    return false;
                }
                let at = self.byte_index(self.cursor);
                self.value.remove(at);
                true
            }
            KeyCode::Left => {
                self.cursor = self.cursor.saturating_sub(1);
                false
            }
            KeyCode::Right => {
                self.cursor = (self.cursor + 1).min(self.len());
                false
            }
            KeyCode::Home => {
                self.cursor = 0;
                false
            }
            KeyCode::End => {
                self.cursor = self.len();
                false
            }
            _ => false,
        }
    }
}

enum UiMsg {
    StatesLoaded(ClientResult<Vec<LocationOption>>),
    LocationsLoaded {
        fetch: PendingFetch,
        result: ClientResult<Vec<LocationOption>>,
    },
    BankValidated(Result<BankValidationReceipt, BankValidationError>),
    /// `session_error` is set when registration succeeded but the login could not be saved.
    Submitted {
        result: ClientResult<RegistrationReceipt>,
        session_error: Option<ClientError>,
    },
    CheckoutOpened(ClientResult<CheckoutHandle>),
    PaymentSettled(ClientResult<PaymentOutcome>),
    WorkerFailed(String),
}

struct WizardState {
    page: Page,
    role: RegistrationRole,
    wizard: Wizard,
    inputs: HashMap<&'static str, TextInput>,
    location_cursor: [usize; 4],
    location_loading: [bool; 4],
    modal: Option<Modal>,
    focus: FocusTarget,
    busy: Option<String>,
    existing_session: Option<SessionData>,
    receipt: Option<RegistrationReceipt>,
    checkout: Option<CheckoutHandle>,
    completion_note: Option<String>,
    session_error: Option<String>,
    quit: bool,
}

impl WizardState {
    fn new(existing_session: Option<SessionData>) -> Self {
        Self {
            page: Page::Welcome,
            role: RegistrationRole::Investor,
            wizard: Wizard::new(RegistrationRole::Investor),
            inputs: HashMap::new(),
            location_cursor: [0; 4],
            location_loading: [false; 4],
            modal: None,
            focus: FocusTarget::Button(ButtonFocus::Next),
            busy: None,
            existing_session,
            receipt: None,
            checkout: None,
            completion_note: None,
            session_error: None,
            quit: false,
        }
    }

    fn input(&self, field: &str) -> Option<&TextInput> {
        self.inputs.get(field)
    }
}

fn text(field: &'static str, label: &'static str) -> FieldSpec {
    FieldSpec::Text { field, label }
}

fn page_fields(page: Page, role: RegistrationRole) -> Vec<FieldSpec> {
    match page {
        Page::Personal => vec![
            text(fields::NAME, "Full name"),
            text(fields::MOBILE, "Mobile"),
            text(fields::EMAIL, "Email (optional)"),
            text(fields::ADDRESS, "Address"),
            FieldSpec::Location(CascadeLevel::State),
            FieldSpec::Location(CascadeLevel::District),
            FieldSpec::Location(CascadeLevel::Taluk),
            FieldSpec::Location(CascadeLevel::Village),
            text(fields::PINCODE, "Pincode"),
            text(fields::GENDER, "Gender"),
            text(fields::DOB, "Date of birth (YYYY-MM-DD)"),
        ],
        Page::Documents => vec![
            text(fields::AADHAAR_NUMBER, "Aadhaar number"),
            text(fields::PAN_NUMBER, "PAN"),
            text(fields::PHOTO, "Photo (file path)"),
            text(fields::ID_PROOF, "ID proof (file path)"),
        ],
        Page::Bank => vec![
            text(fields::BANK_NAME, "Bank name"),
            text(fields::ACCOUNT_HOLDER_NAME, "Account holder"),
            text(fields::ACCOUNT_NUMBER, "Account number"),
            text(fields::IFSC_CODE, "IFSC"),
            FieldSpec::ValidateBank,
        ],
        Page::Details => match role {
            RegistrationRole::Investor => vec![
                text(fields::SURVEY_NUMBER, "Survey number"),
                text(fields::LAND_AREA, "Land area (acres)"),
                text(fields::LAND_TYPE, "Land type"),
                text(fields::INVESTMENT_AMOUNT, "Investment amount"),
            ],
            RegistrationRole::ServiceProvider => vec![
                text(fields::SERVICE_CATEGORY, "Service category"),
                text(fields::EXPERIENCE_YEARS, "Experience (years)"),
                text(fields::SERVICE_AREA, "Service area"),
            ],
        },
        Page::Welcome | Page::Payment | Page::Complete => Vec::new(),
    }
}

fn field_label(field: &str) -> &'static str {
    for page in [Page::Personal, Page::Documents, Page::Bank, Page::Details] {
        for role in [RegistrationRole::Investor, RegistrationRole::ServiceProvider] {
            for spec in page_fields(page, role) {
                match spec {
                    FieldSpec::Text { field: f, label } if f == field => return label,
                    FieldSpec::Location(level) if level.field() == field => return level.label(),
                    _ => {}
                }
            }
        }
    }
    "Field"
}

fn page_title(page: Page, role: RegistrationRole) -> &'static str {
    match page {
        Page::Welcome => "Welcome",
        Page::Payment => "Registration Fee",
        Page::Complete => "Registration Complete",
        other => other
            .tab()
            .map(|t| t.title(role))
            .unwrap_or("Registration"),
    }
}

fn next_label(page: Page) -> &'static str {
    match page {
        Page::Welcome => "Start",
        Page::Details => "Submit",
        Page::Payment => "Check payment",
        Page::Complete => "Finish",
        _ => "Next",
    }
}

fn can_go_back(page: Page) -> bool {
    !matches!(page, Page::Welcome | Page::Payment | Page::Complete)
}

fn can_go_next(state: &WizardState) -> bool {
    if state.busy.is_some() {
        return false;
    }
    match state.page {
        Page::Welcome | Page::Complete => true,
        Page::Details => state.wizard.can_submit(),
        Page::Payment => state.checkout.is_some(),
        _ => state.wizard.can_go_next(),
    }
}

fn can_cancel(page: Page) -> bool {
    !matches!(page, Page::Complete)
}

fn default_focus(page: Page, role: RegistrationRole) -> FocusTarget {
    if page_fields(page, role).is_empty() {
        FocusTarget::Button(ButtonFocus::Next)
    } else {
        FocusTarget::Field(0)
    }
}

fn focus_ring(state: &WizardState) -> Vec<FocusTarget> {
    let mut ring: Vec<FocusTarget> = (0..page_fields(state.page, state.role).len())
        .map(FocusTarget::Field)
        .collect();
    ring.push(FocusTarget::Button(ButtonFocus::Back));
    ring.push(FocusTarget::Button(ButtonFocus::Next));
    ring.push(FocusTarget::Button(ButtonFocus::Cancel));
    ring
}

fn move_focus(state: &mut WizardState, forward: bool) {
    let ring = focus_ring(state);
    let pos = ring.iter().position(|f| *f == state.focus).unwrap_or(0);
    let len = ring.len();
    let next = if forward {
        (pos + 1) % len
    } else {
        (pos + len - 1) % len
    };
    state.focus = ring[next];
}

fn focused_button(state: &WizardState) -> ButtonFocus {
    match state.focus {
        FocusTarget::Button(b) => b,
        _ => ButtonFocus::Next,
    }
}

fn set_focused_button(state: &mut WizardState, b: ButtonFocus) {
    state.focus = FocusTarget::Button(b);
}

fn open_modal(state: &mut WizardState, modal: Modal) {
    state.modal = Some(modal);
    set_focused_button(state, ButtonFocus::Next);
}

fn close_modal(state: &mut WizardState) {
    state.modal = None;
    state.focus = default_focus(state.page, state.role);
}

fn show_error(state: &mut WizardState, err: &ClientError) {
    open_modal(
        state,
        Modal::Message {
            title: err.alert_title().to_string(),
            body: err.to_string(),
        },
    );
}

fn enter_page(state: &mut WizardState, page: Page) {
    state.page = page;
    state.focus = default_focus(page, state.role);
}

fn sync_page_to_wizard(state: &mut WizardState) {
    let page = Page::from_tab(state.wizard.tab());
    if page != state.page {
        enter_page(state, page);
    }
}

// =========================
// Workers
// =========================

fn spawn_worker<F, Fut>(tx: &mpsc::Sender<UiMsg>, job: F)
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = UiMsg>,
{
    let tx = tx.clone();
    thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build();
        let msg = match rt {
            Ok(rt) => rt.block_on(job()),
            Err(e) => UiMsg::WorkerFailed(format!("Internal error starting worker: {}", e)),
        };
        let _ = tx.send(msg);
    });
}

fn start_states_load(state: &mut WizardState, tx: &mpsc::Sender<UiMsg>, services: &Services) {
    state.location_loading = [true, false, false, false];
    let directory = services.directory.clone();
    spawn_worker(tx, move || async move {
        UiMsg::StatesLoaded(directory.states().await)
    });
}

fn choose_location(
    state: &mut WizardState,
    level: CascadeLevel,
    tx: &mpsc::Sender<UiMsg>,
    services: &Services,
) {
    let options = state.wizard.cascade().options(level);
    let Some(option) = options.get(state.location_cursor[level.index()]).cloned() else {
        return;
    };
    for d in level.descendants() {
        state.location_cursor[d.index()] = 0;
        state.location_loading[d.index()] = false;
    }
    let Some(fetch) = state.wizard.select_location(level, option) else {
        return;
    };
    state.location_loading[fetch.level.index()] = true;
    let directory = services.directory.clone();
    spawn_worker(tx, move || async move {
        let result = directory.children(fetch.level, &fetch.parent_id).await;
        UiMsg::LocationsLoaded { fetch, result }
    });
}

fn start_bank_validation(state: &mut WizardState, tx: &mpsc::Sender<UiMsg>, services: &Services) {
    if !state.wizard.verification().ready_for_validation() {
        open_modal(
            state,
            Modal::Message {
                title: "Validation Error".to_string(),
                body: "Enter a valid IFSC code and an account number of at least 9 digits."
                    .to_string(),
            },
        );
        return;
    }
    let Some(gateway) = services.bank_validation.clone() else {
        open_modal(
            state,
            Modal::Message {
                title: "Configuration Error".to_string(),
                body: "Bank validation is not configured on this device.".to_string(),
            },
        );
        return;
    };
    state.busy = Some("Validating bank account...".to_string());
    let status = *state.wizard.verification();
    let details = state.wizard.bank_details();
    spawn_worker(tx, move || async move {
        UiMsg::BankValidated(
            verification::validate_bank_account(gateway.as_ref(), &status, &details).await,
        )
    });
}

fn start_submit(state: &mut WizardState, tx: &mpsc::Sender<UiMsg>, services: &Services) {
    state.busy = Some("Submitting registration...".to_string());
    let role = state.wizard.role();
    let form = state.wizard.form().clone();
    let cascade = state.wizard.cascade().clone();
    let services = services.clone();
    spawn_worker(tx, move || async move {
        let result = submission::submit_registration(
            services.registration.as_ref(),
            role,
            &form,
            &cascade,
            &services.checkout_defaults,
        )
        .await;
        // Registration already exists server-side; a save failure keeps the receipt.
        let session_error = match &result {
            Ok(receipt) if receipt.next == NextStep::Complete => {
                submission::finish_registration(&services.sessions, receipt)
                    .await
                    .err()
            }
            _ => None,
        };
        UiMsg::Submitted {
            result,
            session_error,
        }
    });
}

fn start_checkout(state: &mut WizardState, tx: &mpsc::Sender<UiMsg>, services: &Services) {
    let order = match state.receipt.as_ref().map(|r| &r.next) {
        Some(NextStep::Checkout(order)) => order.clone(),
        _ => return,
    };
    let Some(gateway) = services.checkout.clone() else {
        show_error(
            state,
            &ClientError::Config("Payments are not configured on this device.".to_string()),
        );
        return;
    };
    state.checkout = None;
    state.busy = Some("Opening payment page...".to_string());
    spawn_worker(tx, move || async move {
        UiMsg::CheckoutOpened(gateway.open_checkout(&order).await)
    });
}

fn start_payment_check(state: &mut WizardState, tx: &mpsc::Sender<UiMsg>, services: &Services) {
    let (Some(receipt), Some(handle)) = (state.receipt.clone(), state.checkout.clone()) else {
        return;
    };
    let Some(gateway) = services.checkout.clone() else {
        return;
    };
    state.busy = Some("Checking payment...".to_string());
    let sessions = services.sessions.clone();
    spawn_worker(tx, move || async move {
        UiMsg::PaymentSettled(
            submission::settle_checkout(gateway.as_ref(), &sessions, &receipt, &handle).await,
        )
    });
}

fn land_details_note(receipt: &RegistrationReceipt) -> Option<String> {
    match &receipt.land_details {
        SecondaryOutcome::Failed(reason) => Some(format!(
            "Land details could not be saved ({}). You can add them later from your profile.",
            reason
        )),
        _ => None,
    }
}

fn apply_message(
    state: &mut WizardState,
    msg: UiMsg,
    tx: &mpsc::Sender<UiMsg>,
    services: &Services,
) {
    match msg {
        UiMsg::StatesLoaded(result) => {
            state.location_loading[CascadeLevel::State.index()] = false;
            match result {
                Ok(states) => state.wizard.cascade_mut().set_states(states),
                Err(e) => {
                    warn!(
                        "[PHASE: tui] [STEP: cascade] Failed to load states: {}",
                        e.log_details()
                    );
                    state.wizard.cascade_mut().set_states(Vec::new());
                }
            }
        }
        UiMsg::LocationsLoaded { fetch, result } => {
            if state.wizard.apply_location_fetch(&fetch, result) {
                state.location_loading[fetch.level.index()] = false;
            }
        }
        UiMsg::BankValidated(result) => {
            state.busy = None;
            match result {
                Ok(receipt) => {
                    state.wizard.mark_account_validated(&receipt);
                    if !state.wizard.verification().account_validated {
                        open_modal(
                            state,
                            Modal::Message {
                                title: "Bank Details Changed".to_string(),
                                body: "The bank details changed during validation. \
                                       Validate the account again."
                                    .to_string(),
                            },
                        );
                    }
                    sync_page_to_wizard(state);
                }
                Err(e) => {
                    error!(
                        "[PHASE: tui] [STEP: bank_validation] {} (orphaned={:?})",
                        e, e.orphaned
                    );
                    let body = e.user_message();
                    let client: ClientError = e.into();
                    if client.is_retryable_by_user() {
                        open_modal(
                            state,
                            Modal::RetryCancel {
                                title: "Bank Validation Failed".to_string(),
                                body,
                                action: RetryAction::ValidateBank,
                            },
                        );
                    } else {
                        show_error(state, &client);
                    }
                }
            }
        }
        UiMsg::Submitted {
            result,
            session_error,
        } => {
            state.busy = None;
            match result {
                Ok(receipt) => {
                    if let Some(e) = session_error {
                        error!(
                            "[PHASE: tui] [STEP: submit] User {} registered but session not saved: {}",
                            receipt.result.user_id,
                            e.log_details()
                        );
                        state.session_error = Some(e.to_string());
                    }
                    let note = land_details_note(&receipt);
                    let needs_checkout = matches!(receipt.next, NextStep::Checkout(_));
                    state.receipt = Some(receipt);
                    if needs_checkout {
                        enter_page(state, Page::Payment);
                        state.completion_note = note;
                        start_checkout(state, tx, services);
                    } else {
                        state.completion_note = note;
                        enter_page(state, Page::Complete);
                    }
                }
                Err(e) => {
                    warn!(
                        "[PHASE: tui] [STEP: submit] Registration failed: {}",
                        e.log_details()
                    );
                    show_error(state, &e);
                }
            }
        }
        UiMsg::CheckoutOpened(result) => {
            state.busy = None;
            match result {
                Ok(handle) => {
                    info!(
                        "[PHASE: tui] [STEP: payment] Checkout {} opened",
                        handle.id
                    );
                    state.checkout = Some(handle);
                }
                Err(e) => open_modal(
                    state,
                    Modal::RetryCancel {
                        title: "Payment Unavailable".to_string(),
                        body: e.to_string(),
                        action: RetryAction::Payment,
                    },
                ),
            }
        }
        UiMsg::PaymentSettled(result) => {
            state.busy = None;
            match result {
                Ok(PaymentOutcome::Paid { payment_id }) => {
                    info!(
                        "[PHASE: tui] [STEP: payment] Payment {} confirmed",
                        payment_id
                    );
                    enter_page(state, Page::Complete);
                }
                Ok(PaymentOutcome::Pending) => open_modal(
                    state,
                    Modal::RetryCancel {
                        title: "Payment Not Completed".to_string(),
                        body: "The payment has not been completed yet. Retry to check again."
                            .to_string(),
                        action: RetryAction::Payment,
                    },
                ),
                Ok(PaymentOutcome::Failed { reason }) => {
                    state.checkout = None;
                    open_modal(
                        state,
                        Modal::RetryCancel {
                            title: "Payment Failed".to_string(),
                            body: format!("{}. Retry opens a new payment page.", reason),
                            action: RetryAction::Payment,
                        },
                    );
                }
                Err(e) => open_modal(
                    state,
                    Modal::RetryCancel {
                        title: e.alert_title().to_string(),
                        body: e.to_string(),
                        action: RetryAction::Payment,
                    },
                ),
            }
        }
        UiMsg::WorkerFailed(message) => {
            state.busy = None;
            error!("[PHASE: tui] [STEP: worker] {}", message);
            open_modal(
                state,
                Modal::Message {
                    title: "Internal Error".to_string(),
                    body: message,
                },
            );
        }
    }
}

fn drain_messages(
    state: &mut WizardState,
    rx: &mpsc::Receiver<UiMsg>,
    tx: &mpsc::Sender<UiMsg>,
    services: &Services,
) {
    while let Ok(msg) = rx.try_recv() {
        apply_message(state, msg, tx, services);
    }
}

// =========================
// Keys
// =========================

fn sync_text_field(state: &mut WizardState, field: &'static str) {
    let value = state
        .input(field)
        .map(|i| i.value.clone())
        .unwrap_or_default();
    state.wizard.set_field(field, value);
    if field == fields::IFSC_CODE {
        let normalized = state.wizard.form().get(field).unwrap_or_default().to_string();
        if let Some(input) = state.inputs.get_mut(field) {
            if input.value != normalized {
                input.set(normalized);
            }
        }
    }
}

fn activate_next(state: &mut WizardState, tx: &mpsc::Sender<UiMsg>, services: &Services) {
    if !can_go_next(state) {
        return;
    }
    match state.page {
        Page::Welcome => {
            if state.wizard.role() != state.role {
                state.wizard = Wizard::new(state.role);
                state.inputs.clear();
                state.location_cursor = [0; 4];
            }
            info!(
                "[PHASE: tui] [STEP: start] Registering as {}",
                state.role.as_str()
            );
            let tab = state.wizard.tab();
            enter_page(state, Page::from_tab(tab));
            if state.wizard.cascade().options(CascadeLevel::State).is_empty() {
                start_states_load(state, tx, services);
            }
        }
        Page::Details => start_submit(state, tx, services),
        Page::Payment => start_payment_check(state, tx, services),
        Page::Complete => state.quit = true,
        _ => {
            if state.wizard.next() {
                sync_page_to_wizard(state);
            }
        }
    }
}

fn activate_back(state: &mut WizardState) {
    if !can_go_back(state.page) {
        return;
    }
    if state.page == Page::Personal {
        enter_page(state, Page::Welcome);
        return;
    }
    state.wizard.previous();
    sync_page_to_wizard(state);
}

fn handle_modal_key(
    state: &mut WizardState,
    modal: Modal,
    code: KeyCode,
    tx: &mpsc::Sender<UiMsg>,
    services: &Services,
) {
    match modal {
        Modal::Message { .. } => {
            if matches!(code, KeyCode::Enter | KeyCode::Esc) {
                close_modal(state);
            }
        }
        Modal::ConfirmCancel => match code {
            KeyCode::Left | KeyCode::Right | KeyCode::Tab => {
                let next = match focused_button(state) {
                    ButtonFocus::Cancel => ButtonFocus::Next,
                    _ => ButtonFocus::Cancel,
                };
                set_focused_button(state, next);
            }
            KeyCode::Enter => {
                let confirm = focused_button(state) == ButtonFocus::Cancel;
                close_modal(state);
                if confirm {
                    info!(
                        "[PHASE: tui] [STEP: cancel] User cancelled on page {:?}",
                        state.page
                    );
                    state.quit = true;
                }
            }
            KeyCode::Esc => close_modal(state),
            _ => {}
        },
        Modal::RetryCancel { action, .. } => match code {
            KeyCode::Left | KeyCode::Right | KeyCode::Tab => {
                let next = match focused_button(state) {
                    ButtonFocus::Cancel => ButtonFocus::Next,
                    _ => ButtonFocus::Cancel,
                };
                set_focused_button(state, next);
            }
            KeyCode::Enter => {
                let retry = focused_button(state) == ButtonFocus::Next;
                close_modal(state);
                match (action, retry) {
                    (RetryAction::ValidateBank, true) => start_bank_validation(state, tx, services),
                    (RetryAction::ValidateBank, false) => {}
                    (RetryAction::Payment, true) => {
                        if state.checkout.is_some() {
                            start_payment_check(state, tx, services);
                        } else {
                            start_checkout(state, tx, services);
                        }
                    }
                    (RetryAction::Payment, false) => {
                        warn!("[PHASE: tui] [STEP: payment] Payment abandoned; session not saved");
                        state.checkout = None;
                        state.completion_note = Some(
                            "Your registration was recorded but the fee is unpaid. \
                             Contact the cooperative office to complete payment."
                                .to_string(),
                        );
                        state.receipt = None;
                        enter_page(state, Page::Complete);
                    }
                }
            }
            KeyCode::Esc => close_modal(state),
            _ => {}
        },
    }
}

fn handle_key(
    state: &mut WizardState,
    code: KeyCode,
    tx: &mpsc::Sender<UiMsg>,
    services: &Services,
) {
    if let Some(modal) = state.modal.clone() {
        handle_modal_key(state, modal, code, tx, services);
        return;
    }

    // Worker in flight: the form and navigation are frozen until its result lands.
    if state.busy.is_some() && code != KeyCode::Esc {
        return;
    }

    match code {
        KeyCode::Esc => {
            if can_cancel(state.page) {
                open_modal(state, Modal::ConfirmCancel);
            }
            return;
        }
        KeyCode::Tab | KeyCode::Down => {
            move_focus(state, true);
            return;
        }
        KeyCode::BackTab | KeyCode::Up => {
            move_focus(state, false);
            return;
        }
        _ => {}
    }

    if state.page == Page::Welcome {
        match code {
            KeyCode::Left | KeyCode::Right | KeyCode::Char(' ') => {
                state.role = match state.role {
                    RegistrationRole::Investor => RegistrationRole::ServiceProvider,
                    RegistrationRole::ServiceProvider => RegistrationRole::Investor,
                };
                return;
            }
            KeyCode::Enter if state.focus != FocusTarget::Button(ButtonFocus::Cancel) => {
                activate_next(state, tx, services);
                return;
            }
            _ => {}
        }
    }

    match state.focus {
        FocusTarget::Field(i) => {
            let specs = page_fields(state.page, state.role);
            let Some(spec) = specs.get(i).copied() else {
                return;
            };
            match spec {
                FieldSpec::Text { field, .. } => {
                    if code == KeyCode::Enter {
                        move_focus(state, true);
                        return;
                    }
                    let input = state
                        .inputs
                        .entry(field)
                        .or_insert_with(TextInput::default);
                    if input.handle_key(code) {
                        sync_text_field(state, field);
                    }
                }
                FieldSpec::Location(level) => {
                    let count = state.wizard.cascade().options(level).len();
                    let cursor = &mut state.location_cursor[level.index()];
                    match code {
                        KeyCode::Left if count > 0 => *cursor = (*cursor + count - 1) % count,
                        KeyCode::Right if count > 0 => *cursor = (*cursor + 1) % count,
                        KeyCode::Enter => choose_location(state, level, tx, services),
                        _ => {}
                    }
                }
                FieldSpec::ValidateBank => {
                    if code == KeyCode::Enter {
                        start_bank_validation(state, tx, services);
                    }
                }
            }
        }
        FocusTarget::Button(b) => match code {
            KeyCode::Left => {
                let prev = match b {
                    ButtonFocus::Back => ButtonFocus::Cancel,
                    ButtonFocus::Next => ButtonFocus::Back,
                    ButtonFocus::Cancel => ButtonFocus::Next,
                };
                set_focused_button(state, prev);
            }
            KeyCode::Right => {
                let next = match b {
                    ButtonFocus::Back => ButtonFocus::Next,
                    ButtonFocus::Next => ButtonFocus::Cancel,
                    ButtonFocus::Cancel => ButtonFocus::Back,
                };
                set_focused_button(state, next);
            }
            KeyCode::Enter => match b {
                ButtonFocus::Back => activate_back(state),
                ButtonFocus::Next => activate_next(state, tx, services),
                ButtonFocus::Cancel => {
                    if can_cancel(state.page) {
                        open_modal(state, Modal::ConfirmCancel);
                    }
                }
            },
            _ => {}
        },
    }
}

// =========================
// Entry points
// =========================

pub fn run(services: Services, existing_session: Option<SessionData>) -> Result<()> {
    info!("[PHASE: tui] [STEP: start] Starting registration wizard");

    let mut terminal = setup_terminal()?;
    let result = run_loop(&mut terminal, services, existing_session);
    restore_terminal(&mut terminal)?;

    result
}

fn seed_smoke_state(target: &str) -> WizardState {
    let mut state = WizardState::new(None);
    let directory = smoke::SampleDirectory::new();
    let processor = smoke::ScriptedProcessor::approving();

    let page = match target {
        "personal" => Page::Personal,
        "documents" | "docs" => Page::Documents,
        "bank" => Page::Bank,
        "details" | "land" | "service" => Page::Details,
        "payment" | "retry" => Page::Payment,
        "complete" => Page::Complete,
        _ => Page::Welcome,
    };
    if target == "service" {
        state.role = RegistrationRole::ServiceProvider;
        state.wizard = Wizard::new(state.role);
    }

    if page != Page::Welcome {
        futures::executor::block_on(smoke::select_sample_location(
            &mut state.wizard,
            &directory,
        ));
        let current = page.tab().map(|t| t.index());
        for tab in WizardTab::ALL {
            if current.map(|c| tab.index() > c).unwrap_or(false) {
                break;
            }
            smoke::fill_tab(&mut state.wizard, tab);
            if tab == WizardTab::Documents {
                state
                    .wizard
                    .set_field(fields::PHOTO, "https://files.invalid/smoke/photo.jpg");
                state
                    .wizard
                    .set_field(fields::ID_PROOF, "https://files.invalid/smoke/id_proof.pdf");
            }
            if tab == WizardTab::Bank && Some(tab.index()) != current {
                let details = state.wizard.bank_details();
                let status = *state.wizard.verification();
                if let Ok(receipt) = futures::executor::block_on(
                    verification::validate_bank_account(&processor, &status, &details),
                ) {
                    state.wizard.mark_account_validated(&receipt);
                }
            }
            if Some(tab.index()) != current {
                state.wizard.next();
            }
        }
        for (field, value) in state.wizard.form().filled() {
            if let Some(spec_field) = [Page::Personal, Page::Documents, Page::Bank, Page::Details]
                .iter()
                .flat_map(|p| page_fields(*p, state.role))
                .find_map(|s| match s {
                    FieldSpec::Text { field: f, .. } if f == field => Some(f),
                    _ => None,
                })
            {
                state.inputs.insert(spec_field, TextInput::new(value));
            }
        }
    }

    if matches!(page, Page::Payment | Page::Complete) {
        let backend = smoke::ScriptedBackend::with_fee(500.0);
        let defaults = CheckoutDefaults {
            currency: "INR".to_string(),
            description: "Cooperative registration fee".to_string(),
        };
        state.receipt = futures::executor::block_on(submission::submit_registration(
            &backend,
            state.role,
            state.wizard.form(),
            state.wizard.cascade(),
            &defaults,
        ))
        .ok();
        state.checkout = Some(CheckoutHandle {
            id: "plink_0001".to_string(),
            url: "https://pay.invalid/plink_0001".to_string(),
        });
    }
    if target == "retry" {
        state.checkout = None;
        state.modal = Some(Modal::RetryCancel {
            title: "Payment Failed".to_string(),
            body: "Payment link cancelled. Retry opens a new payment page.".to_string(),
            action: RetryAction::Payment,
        });
    }
    state.page = page;
    state.focus = default_focus(page, state.role);
    state
}

/// Non-interactive smoke mode: render a single frame and exit.
/// Targets: welcome|personal|documents|bank|details|service|payment|retry|complete
pub fn smoke(target: &str) -> Result<()> {
    info!(
        "[PHASE: tui] [STEP: smoke] Rendering single-frame TUI smoke target={}",
        target
    );

    let t = target.trim().to_ascii_lowercase();
    let state = seed_smoke_state(t.as_str());

    let backend = TestBackend::new(100, 30);
    let mut terminal = Terminal::new(backend)?;
    terminal.draw(|f| draw(f.size(), f, &state))?;

    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    terminal.backend_mut().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    services: Services,
    existing_session: Option<SessionData>,
) -> Result<()> {
    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();
    let mut state = WizardState::new(existing_session);
    let (tx, rx) = mpsc::channel::<UiMsg>();

    while !state.quit {
        drain_messages(&mut state, &rx, &tx, &services);
        terminal.draw(|f| draw(f.size(), f, &state))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_millis(0));

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                handle_key(&mut state, key.code, &tx, &services);
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }
    }

    Ok(())
}

// =========================
// Drawing
// =========================

fn centered_window(area: Rect, width: u16, height: u16) -> Rect {
    let w = width.min(area.width.saturating_sub(2)).max(60);
    let h = height.min(area.height.saturating_sub(2)).max(20);
    let x = area.x + (area.width.saturating_sub(w)) / 2;
    let y = area.y + (area.height.saturating_sub(h)) / 2;
    Rect {
        x,
        y,
        width: w.min(area.width),
        height: h.min(area.height),
    }
}

fn focus_style(focused: bool) -> Style {
    if focused {
        Style::default().add_modifier(Modifier::REVERSED)
    } else {
        Style::default()
    }
}

fn step_list(state: &WizardState) -> Text<'static> {
    let mut lines = vec![
        Line::from(Span::styled(
            "Farmer Cooperative",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(format!("Role: {}", state.role.display_name())),
        Line::from(""),
    ];
    for tab in WizardTab::ALL {
        let current = state.page.tab() == Some(tab);
        let done = state.wizard.is_step_valid(tab.index());
        let marker = match (current, done) {
            (true, _) => ">",
            (false, true) => "*",
            (false, false) => " ",
        };
        lines.push(Line::from(Span::styled(
            format!("{} {}", marker, tab.title(state.role)),
            if current {
                Style::default().add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            },
        )));
    }
    let paid = if state.page == Page::Payment { ">" } else { " " };
    lines.push(Line::from(format!("{} Registration fee", paid)));
    Text::from(lines)
}

fn location_line(state: &WizardState, level: CascadeLevel, focused: bool) -> Line<'static> {
    let cascade = state.wizard.cascade();
    let options = cascade.options(level);
    let parent_selected = match level {
        CascadeLevel::State => true,
        _ => CascadeLevel::ALL
            .get(level.index() - 1)
            .map(|p| cascade.selected(*p).is_some())
            .unwrap_or(false),
    };
    let value = if !parent_selected {
        "-".to_string()
    } else if state.location_loading[level.index()] && options.is_empty() {
        "(loading...)".to_string()
    } else if options.is_empty() {
        "(no options)".to_string()
    } else if focused {
        let i = state.location_cursor[level.index()].min(options.len() - 1);
        let mark = if cascade.selected(level) == Some(&options[i]) {
            " (selected)"
        } else {
            ""
        };
        format!("< {} >{}  {}/{}", options[i].name, mark, i + 1, options.len())
    } else {
        cascade
            .selected(level)
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "(choose)".to_string())
    };
    Line::from(Span::styled(
        format!("{:<28} {}", level.label(), value),
        focus_style(focused),
    ))
}

fn page_body(state: &WizardState) -> Text<'static> {
    let mut lines: Vec<Line<'static>> = Vec::new();
    match state.page {
        Page::Welcome => {
            let inv = if state.role == RegistrationRole::Investor {
                "[Investor]"
            } else {
                " Investor "
            };
            let sp = if state.role == RegistrationRole::ServiceProvider {
                "[Service Provider]"
            } else {
                " Service Provider "
            };
            lines.push(Line::from("Register with the cooperative as:"));
            lines.push(Line::from(""));
            lines.push(Line::from(format!("  {}    {}", inv, sp)));
            lines.push(Line::from(""));
            lines.push(Line::from(
                "Use Left/Right to change selection, Enter to start.",
            ));
            if let Some(s) = &state.existing_session {
                lines.push(Line::from(""));
                lines.push(Line::from(format!(
                    "A session for user {} ({}) is stored on this device.",
                    s.user_id, s.user_role
                )));
                lines.push(Line::from("Completing a new registration replaces it."));
            }
        }
        Page::Payment => {
            if let Some(NextStep::Checkout(order)) = state.receipt.as_ref().map(|r| &r.next) {
                lines.push(Line::from(format!(
                    "Registration fee: {}",
                    order.display_amount()
                )));
            }
            lines.push(Line::from(""));
            match &state.checkout {
                Some(handle) => {
                    lines.push(Line::from("Open this link to pay:"));
                    lines.push(Line::from(Span::styled(
                        handle.url.clone(),
                        Style::default().add_modifier(Modifier::UNDERLINED),
                    )));
                    lines.push(Line::from(""));
                    lines.push(Line::from(
                        "When the payment is done, choose Check payment.",
                    ));
                }
                None => lines.push(Line::from("Waiting for the payment page...")),
            }
            lines.push(Line::from(""));
            lines.push(Line::from(
                "Your login is saved on this device only after the fee is paid.",
            ));
        }
        Page::Complete => {
            match state.receipt.as_ref() {
                Some(r) => {
                    lines.push(Line::from(format!(
                        "Registration complete. Your member id is {}.",
                        r.result.user_id
                    )));
                    match &state.session_error {
                        Some(e) => {
                            lines.push(Line::from("Sign-in could not be saved on this device."));
                            lines.push(Line::from(format!("({})", e)));
                            lines.push(Line::from("Keep your member id to sign in later."));
                        }
                        None => lines.push(Line::from("You are now signed in on this device.")),
                    }
                }
                None => lines.push(Line::from("Registration finished.")),
            }
            if let Some(note) = &state.completion_note {
                lines.push(Line::from(""));
                lines.push(Line::from(note.clone()));
            }
        }
        _ => {
            for (i, spec) in page_fields(state.page, state.role).iter().enumerate() {
                let focused = state.focus == FocusTarget::Field(i);
                match *spec {
                    FieldSpec::Text { field, label } => {
                        let value = state
                            .input(field)
                            .map(|t| t.value.clone())
                            .unwrap_or_default();
                        let shown = if focused { format!("{}_", value) } else { value };
                        lines.push(Line::from(Span::styled(
                            format!("{:<28} {}", label, shown),
                            focus_style(focused),
                        )));
                    }
                    FieldSpec::Location(level) => {
                        lines.push(location_line(state, level, focused));
                    }
                    FieldSpec::ValidateBank => {
                        let v = state.wizard.verification();
                        let status = if v.account_validated {
                            "validated"
                        } else if v.ready_for_validation() {
                            "ready"
                        } else {
                            "enter a valid IFSC and account number"
                        };
                        lines.push(Line::from(""));
                        lines.push(Line::from(vec![
                            Span::styled("[ Validate account ]", focus_style(focused)),
                            Span::raw(format!("  {}", status)),
                        ]));
                    }
                }
            }
            let missing = state.wizard.missing_fields();
            if !missing.is_empty() && state.page.tab() == Some(state.wizard.tab()) {
                let names: Vec<&str> = missing.iter().map(|f| field_label(f)).collect();
                lines.push(Line::from(""));
                lines.push(Line::from(Span::styled(
                    format!("Required: {}", names.join(", ")),
                    Style::default().fg(Color::Yellow),
                )));
            }
        }
    }
    if let Some(busy) = &state.busy {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            busy.clone(),
            Style::default().fg(Color::Cyan),
        )));
    }
    Text::from(lines)
}

fn draw(area: Rect, f: &mut ratatui::Frame<'_>, state: &WizardState) {
    let window_area = centered_window(area, 100, 30);

    let outer_block = Block::default()
        .borders(Borders::ALL)
        .title("Cooperative Registration");
    f.render_widget(outer_block, window_area);

    let inner = window_area.inner(&ratatui::layout::Margin {
        vertical: 1,
        horizontal: 1,
    });
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)].as_ref())
        .split(inner);

    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(26), Constraint::Min(0)].as_ref())
        .split(rows[0]);

    let steps = Paragraph::new(step_list(state))
        .block(Block::default().borders(Borders::ALL))
        .wrap(Wrap { trim: false });
    f.render_widget(steps, cols[0]);

    let content = Paragraph::new(page_body(state))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(page_title(state.page, state.role)),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(content, cols[1]);

    draw_buttons(f, rows[1], state);

    match &state.modal {
        Some(Modal::ConfirmCancel) => draw_choice_modal(
            f,
            window_area,
            "Cancel Registration?",
            "Anything entered so far will be lost.",
            ("Yes, cancel", "No"),
            state,
        ),
        Some(Modal::Message { title, body }) => draw_message_modal(f, window_area, title, body),
        Some(Modal::RetryCancel { title, body, .. }) => {
            draw_choice_modal(f, window_area, title, body, ("Cancel", "Retry"), state)
        }
        None => {}
    }
}

fn button_text(label: &str, focused: bool, enabled: bool) -> Span<'static> {
    let mut style = Style::default();
    if !enabled {
        style = style.fg(Color::DarkGray);
    }
    if focused && enabled {
        style = style.add_modifier(Modifier::REVERSED);
    }
    Span::styled(format!("[ {} ]", label), style)
}

fn draw_buttons(f: &mut ratatui::Frame<'_>, area: Rect, state: &WizardState) {
    let in_modal = state.modal.is_some();
    let back = button_text(
        "Back",
        !in_modal && state.focus == FocusTarget::Button(ButtonFocus::Back),
        can_go_back(state.page) && state.busy.is_none(),
    );
    let next = button_text(
        next_label(state.page),
        !in_modal && state.focus == FocusTarget::Button(ButtonFocus::Next),
        can_go_next(state),
    );
    let cancel = button_text(
        "Cancel",
        !in_modal && state.focus == FocusTarget::Button(ButtonFocus::Cancel),
        can_cancel(state.page),
    );

    let line = Line::from(vec![back, Span::raw(" "), next, Span::raw(" "), cancel]);
    let p = Paragraph::new(Text::from(line)).alignment(Alignment::Right);
    f.render_widget(p, area);
}

fn modal_area(window_area: Rect, width: u16, height: u16) -> Rect {
    let w = width.min(window_area.width.saturating_sub(4)).max(40);
    let h = height.min(window_area.height.saturating_sub(4)).max(7);
    Rect {
        x: window_area.x + (window_area.width.saturating_sub(w)) / 2,
        y: window_area.y + (window_area.height.saturating_sub(h)) / 2,
        width: w,
        height: h,
    }
}

fn modal_buttons_area(area: Rect) -> Rect {
    Rect {
        x: area.x + 1,
        y: area.y + area.height.saturating_sub(2),
        width: area.width.saturating_sub(2),
        height: 1,
    }
}

/// Two-button modal. The left label maps to Cancel, the right (primary) one to Next.
fn draw_choice_modal(
    f: &mut ratatui::Frame<'_>,
    window_area: Rect,
    title: &str,
    body: &str,
    labels: (&str, &str),
    state: &WizardState,
) {
    let area = modal_area(window_area, 60, 9);
    f.render_widget(ratatui::widgets::Clear, area);
    let p = Paragraph::new(Text::from(body.to_string()))
        .block(Block::default().borders(Borders::ALL).title(title.to_string()))
        .wrap(Wrap { trim: false });
    f.render_widget(p, area);

    let left = Span::styled(
        format!("[ {} ]", labels.0),
        focus_style(focused_button(state) == ButtonFocus::Cancel),
    );
    let right = Span::styled(
        format!("[ {} ]", labels.1),
        focus_style(focused_button(state) == ButtonFocus::Next),
    );
    let line = Line::from(vec![left, Span::raw(" "), right]);
    f.render_widget(
        Paragraph::new(Text::from(line)).alignment(Alignment::Right),
        modal_buttons_area(area),
    );
}

fn draw_message_modal(f: &mut ratatui::Frame<'_>, window_area: Rect, title: &str, body: &str) {
    let area = modal_area(window_area, 70, 10);
    f.render_widget(ratatui::widgets::Clear, area);
    let p = Paragraph::new(Text::from(body.to_string()))
        .block(Block::default().borders(Borders::ALL).title(title.to_string()))
        .wrap(Wrap { trim: false });
    f.render_widget(p, area);

    let ok = Span::styled("[ OK ]", focus_style(true));
    f.render_widget(
        Paragraph::new(Text::from(Line::from(vec![ok]))).alignment(Alignment::Right),
        modal_buttons_area(area),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smoke::{SampleDirectory, ScriptedBackend, ScriptedProcessor};

    fn services(tmp: &std::path::Path) -> Services {
        let processor = Arc::new(ScriptedProcessor::approving());
        Services {
            directory: Arc::new(SampleDirectory::new()),
            registration: Arc::new(ScriptedBackend::with_fee(0.0)),
            bank_validation: Some(processor.clone()),
            checkout: Some(processor),
            sessions: Arc::new(SessionContext::new(tmp)),
            checkout_defaults: CheckoutDefaults {
                currency: "INR".to_string(),
                description: "Registration fee".to_string(),
            },
        }
    }

    fn render(state: &WizardState) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|f| draw(f.size(), f, state)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        buffer
            .content
            .chunks(buffer.area.width as usize)
            .map(|row| row.iter().map(|c| c.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn type_text(state: &mut WizardState, s: &str, tx: &mpsc::Sender<UiMsg>, svc: &Services) {
        for c in s.chars() {
            handle_key(state, KeyCode::Char(c), tx, svc);
        }
    }

    #[test]
    fn every_smoke_target_renders() {
        for target in [
            "welcome", "personal", "documents", "bank", "details", "service", "payment",
            "retry", "complete",
        ] {
            smoke(target).unwrap();
        }
    }

    #[test]
    fn smoke_details_page_is_ready_to_submit() {
        let state = seed_smoke_state("details");
        assert_eq!(state.page, Page::Details);
        assert!(state.wizard.can_submit());
        let screen = render(&state);
        assert!(screen.contains("Land Details"));
        assert!(screen.contains("[ Submit ]"));
    }

    #[test]
    fn smoke_payment_page_shows_fee_and_link() {
        let state = seed_smoke_state("payment");
        assert!(state.receipt.is_some());
        let screen = render(&state);
        assert!(screen.contains("INR 500.00"));
        assert!(screen.contains("https://pay.invalid/plink_0001"));
    }

    #[test]
    fn text_input_is_char_safe() {
        let mut input = TextInput::new("ரவி");
        assert_eq!(input.cursor, 3);
        input.handle_key(KeyCode::Left);
        input.handle_key(KeyCode::Backspace);
        assert_eq!(input.value, "ரி");
        input.handle_key(KeyCode::Char('x'));
        assert_eq!(input.value, "ரxி");
    }

    #[test]
    fn typing_updates_the_wizard_form_and_next_stays_gated() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = services(tmp.path());
        let (tx, _rx) = mpsc::channel();
        let mut state = WizardState::new(None);
        enter_page(&mut state, Page::Personal);

        type_text(&mut state, "Ravi", &tx, &svc);
        assert_eq!(state.wizard.form().value(fields::NAME), Some("Ravi"));

        set_focused_button(&mut state, ButtonFocus::Next);
        handle_key(&mut state, KeyCode::Enter, &tx, &svc);
        assert_eq!(state.page, Page::Personal);
        assert!(render(&state).contains("Required:"));
    }

    #[test]
    fn ifsc_input_mirrors_normalized_value() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = services(tmp.path());
        let (tx, _rx) = mpsc::channel();
        let mut state = WizardState::new(None);
        enter_page(&mut state, Page::Bank);
        state.focus = FocusTarget::Field(3);
        type_text(&mut state, "hdfc0001234", &tx, &svc);
        assert_eq!(state.input(fields::IFSC_CODE).unwrap().value, "HDFC0001234");
        assert!(state.wizard.verification().ifsc_verified);
    }

    #[test]
    fn start_loads_states_through_worker() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = services(tmp.path());
        let (tx, rx) = mpsc::channel();
        let mut state = WizardState::new(None);
        handle_key(&mut state, KeyCode::Enter, &tx, &svc);
        assert_eq!(state.page, Page::Personal);

        let msg = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        apply_message(&mut state, msg, &tx, &svc);
        assert_eq!(state.wizard.cascade().options(CascadeLevel::State).len(), 2);
    }

    #[test]
    fn stale_location_result_is_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = services(tmp.path());
        let (tx, _rx) = mpsc::channel();
        let mut state = WizardState::new(None);
        state
            .wizard
            .select_location(CascadeLevel::State, LocationOption::new("32", "Kerala"));

        let stale = PendingFetch {
            level: CascadeLevel::District,
            parent_id: "33".to_string(),
        };
        apply_message(
            &mut state,
            UiMsg::LocationsLoaded {
                fetch: stale,
                result: Ok(vec![LocationOption::new("3301", "Madurai")]),
            },
            &tx,
            &svc,
        );
        assert!(state
            .wizard
            .cascade()
            .options(CascadeLevel::District)
            .is_empty());
    }

    #[test]
    fn failed_payment_offers_retry_and_cancel_skips_session() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = services(tmp.path());
        let (tx, _rx) = mpsc::channel();
        let mut state = seed_smoke_state("payment");
        apply_message(
            &mut state,
            UiMsg::PaymentSettled(Ok(PaymentOutcome::Failed {
                reason: "Payment link cancelled".to_string(),
            })),
            &tx,
            &svc,
        );
        assert!(matches!(
            state.modal,
            Some(Modal::RetryCancel {
                action: RetryAction::Payment,
                ..
            })
        ));
        assert!(state.checkout.is_none());

        set_focused_button(&mut state, ButtonFocus::Cancel);
        handle_key(&mut state, KeyCode::Enter, &tx, &svc);
        assert_eq!(state.page, Page::Complete);
        assert!(state.completion_note.is_some());
        assert!(!tmp.path().join(crate::session::SESSION_FILE_NAME).exists());
    }

    #[test]
    fn bank_fields_are_frozen_while_validation_runs() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = services(tmp.path());
        let (tx, rx) = mpsc::channel();
        let mut state = seed_smoke_state("bank");
        let account = state.wizard.bank_details().account_number;

        state.focus = FocusTarget::Field(4);
        handle_key(&mut state, KeyCode::Enter, &tx, &svc);
        assert!(state.busy.is_some());

        state.focus = FocusTarget::Field(2);
        type_text(&mut state, "9", &tx, &svc);
        handle_key(&mut state, KeyCode::Backspace, &tx, &svc);
        assert_eq!(state.wizard.bank_details().account_number, account);

        let msg = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        apply_message(&mut state, msg, &tx, &svc);
        assert!(state.busy.is_none());
        assert!(state.wizard.verification().account_validated);
        assert_eq!(state.page, Page::Details);
    }

    #[test]
    fn validation_result_for_edited_account_keeps_bank_gate_closed() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = services(tmp.path());
        let (tx, _rx) = mpsc::channel();
        let mut state = seed_smoke_state("bank");
        let receipt = BankValidationReceipt {
            contact_id: "cont_0001".to_string(),
            fund_account_id: "fa_0002".to_string(),
            validation_id: "fav_0003".to_string(),
            registered_name: None,
            details: state.wizard.bank_details(),
        };

        state.focus = FocusTarget::Field(2);
        type_text(&mut state, "9", &tx, &svc);
        let edited = state.wizard.bank_details().account_number;
        assert!(edited.ends_with('9'));

        apply_message(&mut state, UiMsg::BankValidated(Ok(receipt)), &tx, &svc);
        assert!(!state.wizard.verification().account_validated);
        assert_eq!(state.page, Page::Bank);
        assert!(!state.wizard.can_reach(3));
        assert!(matches!(state.modal, Some(Modal::Message { .. })));
    }

    #[test]
    fn unsaved_session_still_lands_on_complete() {
        let tmp = tempfile::tempdir().unwrap();
        // A file where the session folder should be makes every save fail.
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, "not a folder").unwrap();
        let mut svc = services(tmp.path());
        svc.sessions = Arc::new(SessionContext::new(&blocker.join("session")));
        let (tx, rx) = mpsc::channel();
        let mut state = seed_smoke_state("details");

        set_focused_button(&mut state, ButtonFocus::Next);
        handle_key(&mut state, KeyCode::Enter, &tx, &svc);
        assert!(state.busy.is_some());

        set_focused_button(&mut state, ButtonFocus::Back);
        handle_key(&mut state, KeyCode::Enter, &tx, &svc);
        assert_eq!(state.page, Page::Details, "back is ignored while submitting");

        let msg = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        apply_message(&mut state, msg, &tx, &svc);
        assert_eq!(state.page, Page::Complete);
        assert!(state.receipt.is_some());
        assert!(state.session_error.is_some());
        assert!(state.modal.is_none());
        assert!(render(&state).contains("could not be saved"));
    }

    #[test]
    fn escape_asks_before_quitting() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = services(tmp.path());
        let (tx, _rx) = mpsc::channel();
        let mut state = WizardState::new(None);
        handle_key(&mut state, KeyCode::Esc, &tx, &svc);
        assert_eq!(state.modal, Some(Modal::ConfirmCancel));
        handle_key(&mut state, KeyCode::Enter, &tx, &svc);
        assert!(!state.quit, "default choice keeps the wizard open");

        handle_key(&mut state, KeyCode::Esc, &tx, &svc);
        handle_key(&mut state, KeyCode::Left, &tx, &svc);
        handle_key(&mut state, KeyCode::Enter, &tx, &svc);
        assert!(state.quit);
    }
}
