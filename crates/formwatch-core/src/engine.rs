//! The capture engine: one instance per page load.
//!
//! Every host notification (submit event, watched click or press, mutation,
//! intercepted request, timer) enters through a method on [`CaptureEngine`].
//! None of them return errors; anything that goes wrong is logged at debug
//! and the notification is dropped.

use crate::dispatch::{DeliveryChannel, DispatchOutcome, Dispatcher, SubmissionBuilder};
use crate::dom::{Dom, NodeId};
use crate::extract::generic::{form_action, resolve_against};
use crate::extract::profile::{NATIVE_PROFILE, ProviderProfile, page_title, scan_document};
use crate::extract::salvage::salvage;
use crate::extract::{GenericExtractor, extractor_for};
use crate::ignore::IgnorePolicy;
use crate::network::{ObservedRequest, RequestObserver, classify_request, is_telemetry, parse_body};
use crate::provider::classify_dom;
use crate::retry::{ChainId, RetryPolicy, RetryScheduler, RetryStep};
use crate::timers::{Clock, TimerQueue};
use crate::watcher::{DiscoverySource, SubmitTriggerWatcher};
use formwatch_common::{CaptureConfig, FieldMap, ProviderKind, SubmissionSource, TriggerSource};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

/// Delayed work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Begin a retry chain: delayed click, press and cross-check captures.
    StartChain {
        trigger: TriggerSource,
        origin: Option<NodeId>,
    },
    /// Next attempt of a running chain.
    Attempt(ChainId),
    /// Periodic watcher poll.
    Rescan,
}

/// Per-page state owned by the engine.
#[derive(Debug)]
pub struct ProviderContext {
    /// Re-derived before every extraction attempt.
    pub provider: ProviderKind,
    pub watcher: SubmitTriggerWatcher,
    pub retry: RetryScheduler,
}

/// One extraction result, before the ignore check.
#[derive(Debug, Clone)]
struct Capture {
    source: SubmissionSource,
    fields: FieldMap,
    action: String,
    title: String,
}

pub struct CaptureEngine<D, K, C> {
    dom: D,
    clock: K,
    config: CaptureConfig,
    ignore: IgnorePolicy,
    context: ProviderContext,
    timers: TimerQueue<Task>,
    dispatcher: Dispatcher<C>,
    started: bool,
}

impl<D: Dom, K: Clock, C: DeliveryChannel> CaptureEngine<D, K, C> {
    pub fn new(dom: D, clock: K, channel: C, config: CaptureConfig) -> Self {
        let provider = classify_dom(&dom);
        debug!("Capture engine for {} page", provider.as_str());
        Self {
            ignore: IgnorePolicy::from_config(&config.ignore),
            dispatcher: Dispatcher::new(channel, config.dispatch.duplicate_window_ms),
            context: ProviderContext {
                provider,
                watcher: SubmitTriggerWatcher::new(),
                retry: RetryScheduler::new(),
            },
            timers: TimerQueue::new(),
            dom,
            clock,
            config,
            started: false,
        }
    }

    /// Initial trigger scan and the first poll. Later calls do nothing.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        if self.config.watcher.enabled {
            self.discover(DiscoverySource::Initial);
            let due = self.clock.now_ms() + self.rescan_interval_ms();
            self.timers.schedule(due, Task::Rescan);
        }
    }

    /// A `submit` event reached the document. The first attempt runs now,
    /// before the page can navigate away.
    pub fn on_submit(&mut self, form: NodeId) {
        let now = self.clock.now_ms();
        self.start_chain(TriggerSource::NativeSubmit, Some(form), now);
    }

    /// Subtree or attribute mutation somewhere in the document.
    pub fn on_mutation(&mut self) {
        if self.config.watcher.enabled {
            self.discover(DiscoverySource::Mutation);
        }
    }

    /// Click on a watched control: one chain per configured delay.
    pub fn on_click(&mut self, node: NodeId) {
        let now = self.clock.now_ms();
        for delay in self.config.watcher.click_delays_ms.clone() {
            self.timers.schedule(
                now + delay,
                Task::StartChain {
                    trigger: TriggerSource::WatchedClick,
                    origin: Some(node),
                },
            );
        }
    }

    /// Mousedown/pointerdown on a watched control, ahead of the click.
    pub fn on_press(&mut self, node: NodeId) {
        let due = self.clock.now_ms() + self.config.watcher.press_delay_ms;
        self.timers.schedule(
            due,
            Task::StartChain {
                trigger: TriggerSource::WatchedPress,
                origin: Some(node),
            },
        );
    }

    /// An intercepted outgoing request, seen before it is delegated.
    pub fn on_request(&mut self, request: &ObservedRequest) {
        if !self.config.network.enabled || !request.is_candidate() {
            return;
        }
        let now = self.clock.now_ms();
        let classification = classify_request(request);

        if classification.provider.is_some() {
            self.timers.schedule(
                now + self.config.network.cross_check_delay_ms,
                Task::StartChain {
                    trigger: TriggerSource::CrossCheck,
                    origin: None,
                },
            );
        } else if !self.config.network.capture_unclassified
            || is_telemetry(&request.url, &self.config.network.telemetry_fragments)
        {
            return;
        }

        let Some(body) = &request.body else {
            return;
        };
        let parsed = match parse_body(body) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("Request body to {} not captured: {}", request.url, e);
                return;
            }
        };
        if parsed.fields.is_empty() || (classification.provider.is_none() && !parsed.form_shaped) {
            return;
        }

        let page = self.page_href();
        let (source, title) = match classification.provider {
            Some(kind) => (kind.source(), self.title_for(kind)),
            None => (SubmissionSource::FetchGeneric, self.title_for(ProviderKind::Native)),
        };
        let capture = Capture {
            source,
            fields: parsed.fields,
            action: resolve_against(&page, &classification.url),
            title,
        };
        self.submit(TriggerSource::Network, capture, now);
    }

    /// Run every task due at or before `now`. A task's due time is the
    /// logical present for whatever it schedules, except the poll, which
    /// reschedules from `now` so one call runs it at most once. Returns the
    /// number of tasks run.
    pub fn run_due(&mut self, now: u64) -> usize {
        let mut ran = 0;
        while let Some((due, task)) = self.timers.pop_due(now) {
            self.run_task(task, due, now);
            ran += 1;
        }
        ran
    }

    pub fn next_due(&self) -> Option<u64> {
        self.timers.next_due()
    }

    pub fn pending_tasks(&self) -> usize {
        self.timers.len()
    }

    pub fn dom(&self) -> &D {
        &self.dom
    }

    pub fn dom_mut(&mut self) -> &mut D {
        &mut self.dom
    }

    pub fn clock(&self) -> &K {
        &self.clock
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn context(&self) -> &ProviderContext {
        &self.context
    }

    pub fn dispatcher(&self) -> &Dispatcher<C> {
        &self.dispatcher
    }

    fn run_task(&mut self, task: Task, due: u64, now: u64) {
        match task {
            Task::StartChain { trigger, origin } => self.start_chain(trigger, origin, due),
            Task::Attempt(id) => self.run_attempt(id, due),
            Task::Rescan => {
                if self.config.watcher.enabled {
                    self.discover(DiscoverySource::Poll);
                    self.timers
                        .schedule(now + self.rescan_interval_ms(), Task::Rescan);
                }
            }
        }
    }

    /// Never zero, so the next poll is always strictly in the future.
    fn rescan_interval_ms(&self) -> u64 {
        self.config.watcher.rescan_interval_ms.max(1)
    }

    fn discover(&mut self, source: DiscoverySource) {
        let provider = self.refresh_provider();
        let added = self.context.watcher.discover(&mut self.dom, provider, source);
        if !added.is_empty() {
            debug!("{:?} scan instrumented {} control(s)", source, added.len());
        }
    }

    fn refresh_provider(&mut self) -> ProviderKind {
        let provider = classify_dom(&self.dom);
        if provider != self.context.provider {
            debug!(
                "Provider changed from {} to {}",
                self.context.provider.as_str(),
                provider.as_str()
            );
            self.context.provider = provider;
        }
        provider
    }

    fn start_chain(&mut self, trigger: TriggerSource, origin: Option<NodeId>, now: u64) {
        let policy = RetryPolicy::from_config(&self.config.retry, trigger);
        let id = self.context.retry.start(trigger, origin, policy);
        self.run_attempt(id, now);
    }

    fn run_attempt(&mut self, id: ChainId, now: u64) {
        let Some(chain) = self.context.retry.begin_attempt(id) else {
            return;
        };
        let (trigger, origin, attempt) = (chain.trigger, chain.origin, chain.attempt);

        let capture = self.extract(origin);
        let found = !capture.fields.is_empty();
        match self.context.retry.settle(id, found) {
            Some(RetryStep::Done) => self.submit(trigger, capture, now),
            Some(RetryStep::Retry { attempt: next, delay_ms }) => {
                debug!(
                    "{:?} attempt {} found nothing, retrying in {} ms (attempt {})",
                    trigger, attempt, delay_ms, next
                );
                self.timers.schedule(now + delay_ms, Task::Attempt(id));
            }
            Some(RetryStep::Salvage) => {
                let fields = salvage(&self.dom, self.profile_for(self.context.provider));
                if fields.is_empty() {
                    debug!("{:?} chain abandoned after salvage", trigger);
                } else {
                    self.submit(trigger, Capture { fields, ..capture }, now);
                }
            }
            Some(RetryStep::Abandon) => debug!("{:?} chain abandoned", trigger),
            None => {}
        }
    }

    /// Read the page according to its current provider.
    fn extract(&mut self, origin: Option<NodeId>) -> Capture {
        let provider = self.refresh_provider();
        let page = self.page_href();

        if let Some(extractor) = extractor_for(provider) {
            let kind = extractor.kind();
            debug!("Extracting with the {} extractor", kind.as_str());
            return Capture {
                source: kind.source(),
                fields: extractor.extract(&self.dom),
                action: page,
                title: extractor.title(&self.dom),
            };
        }

        let title = page_title(&self.dom, &NATIVE_PROFILE);
        let form = origin.and_then(|node| self.dom.closest(node, "form").ok().flatten());
        let (fields, action) = match form {
            Some(form) => (
                GenericExtractor.extract_form(&self.dom, form),
                form_action(&self.dom, form, &page),
            ),
            None => (scan_document(&self.dom, &NATIVE_PROFILE), page),
        };
        Capture {
            source: SubmissionSource::Native,
            fields,
            action,
            title,
        }
    }

    /// The single exit: ignore check, then build and dispatch.
    fn submit(&mut self, trigger: TriggerSource, capture: Capture, now: u64) {
        let page = self.page_href();
        if let Some(pattern) = self.ignore.matching_pattern(&page, &capture.action) {
            debug!("{:?} capture ignored: matches {:?}", trigger, pattern);
            return;
        }
        let submission = SubmissionBuilder::new(capture.source, capture.fields)
            .url(page)
            .action(capture.action)
            .title(capture.title)
            .timestamp_ms(self.clock.epoch_ms())
            .build();
        if self.dispatcher.dispatch(submission, now) == DispatchOutcome::Duplicate {
            debug!("{:?} capture was a duplicate", trigger);
        }
    }

    fn page_href(&self) -> String {
        self.dom.location().map(|l| l.href).unwrap_or_default()
    }

    fn profile_for(&self, provider: ProviderKind) -> &'static ProviderProfile {
        extractor_for(provider)
            .map(|e| e.profile())
            .unwrap_or(&NATIVE_PROFILE)
    }

    fn title_for(&self, provider: ProviderKind) -> String {
        page_title(&self.dom, self.profile_for(provider))
    }
}

/// Shared handle for host callbacks that all need the same engine.
pub struct SharedEngine<D, K, C>(Rc<RefCell<CaptureEngine<D, K, C>>>);

impl<D, K, C> Clone for SharedEngine<D, K, C> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<D: Dom, K: Clock, C: DeliveryChannel> SharedEngine<D, K, C> {
    pub fn new(engine: CaptureEngine<D, K, C>) -> Self {
        Self(Rc::new(RefCell::new(engine)))
    }

    /// Run `f` against the engine. A re-entrant call (a callback fired while
    /// the engine is already busy) is dropped and yields `None`.
    pub fn with<R>(&self, f: impl FnOnce(&mut CaptureEngine<D, K, C>) -> R) -> Option<R> {
        match self.0.try_borrow_mut() {
            Ok(mut engine) => Some(f(&mut engine)),
            Err(_) => {
                debug!("Engine busy, dropping re-entrant notification");
                None
            }
        }
    }
}

impl<D: Dom, K: Clock, C: DeliveryChannel> RequestObserver for SharedEngine<D, K, C> {
    fn observe(&self, request: &ObservedRequest) {
        self.with(|engine| engine.on_request(request));
    }
}
