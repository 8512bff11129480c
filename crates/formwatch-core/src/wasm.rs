//! Browser bindings: a [`Dom`] over the live document, the fetch/XHR
//! decorators installed on `window`, and the `FormCapture` handle a content
//! script constructs once per page.

use crate::dispatch::DeliveryChannel;
use crate::dom::{ControlState, Dom, DomError, ListenerKind, NodeId, PageLocation};
use crate::engine::{CaptureEngine, SharedEngine};
use crate::network::{
    FetchInit, FetchPrimitive, FormDataValue, InterceptedFetch, InterceptedXhr, ObservedRequest,
    RequestBody, RequestObserver, XhrPrimitive, XhrTable,
};
use crate::timers::Clock;
use formwatch_common::{CaptureConfig, ChannelError, DeliveryMessage};
use js_sys::{Array, Function, Promise, Reflect};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tracing::debug;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{
    AddEventListenerOptions, Document, Element, Event, FormData, HtmlInputElement,
    HtmlOptionElement, HtmlSelectElement, HtmlTextAreaElement, MutationObserver,
    MutationObserverInit, UrlSearchParams, Window,
};

const NODE_ID_KEY: &str = "__formwatchNodeId";
const XHR_ID_KEY: &str = "__formwatchXhrId";
/// Registry size below which disconnected elements are not pruned.
const MIN_PRUNE_AT: usize = 512;
const MAX_OPEN_XHRS: usize = 64;

#[wasm_bindgen(inline_js = "
export function wrapMethod(proto, name, hook) {
    proto[name] = function (...args) {
        return hook(this, args);
    };
}
")]
extern "C" {
    #[wasm_bindgen(js_name = wrapMethod)]
    fn wrap_method(proto: &JsValue, name: &str, hook: &Function);
}

fn host_error(e: JsValue) -> DomError {
    DomError::Host(e.as_string().unwrap_or_else(|| format!("{:?}", e)))
}

type ListenerHook = Rc<RefCell<Option<Rc<dyn Fn(ListenerKind, NodeId)>>>>;

/// The live document behind opaque node ids.
///
/// Ids are handed out on first sight and stored on the element as an expando
/// property, so the same element always maps to the same id. Elements no
/// longer in the document are pruned as the registry grows; one that comes
/// back keeps its id and is re-registered on next sight.
pub struct WebDom {
    window: Window,
    document: Document,
    nodes: RefCell<HashMap<NodeId, Element>>,
    next_id: Cell<NodeId>,
    prune_at: Cell<usize>,
    hook: ListenerHook,
    listeners: RefCell<Vec<Closure<dyn FnMut(Event)>>>,
}

impl WebDom {
    pub fn new(window: Window, document: Document) -> Self {
        Self {
            window,
            document,
            nodes: RefCell::new(HashMap::new()),
            next_id: Cell::new(0),
            prune_at: Cell::new(MIN_PRUNE_AT),
            hook: Rc::new(RefCell::new(None)),
            listeners: RefCell::new(Vec::new()),
        }
    }

    pub fn register(&self, element: &Element) -> NodeId {
        let key = JsValue::from_str(NODE_ID_KEY);
        let id = match Reflect::get(element, &key).ok().and_then(|v| v.as_f64()) {
            Some(id) => id as NodeId,
            None => {
                let id = self.next_id.get();
                self.next_id.set(id.wrapping_add(1));
                let _ = Reflect::set(element, &key, &JsValue::from_f64(id as f64));
                id
            }
        };

        let mut nodes = self.nodes.borrow_mut();
        if !nodes.contains_key(&id) {
            if nodes.len() >= self.prune_at.get() {
                nodes.retain(|_, el| el.is_connected());
                self.prune_at.set((nodes.len() * 2).max(MIN_PRUNE_AT));
                debug!("Node registry pruned to {} element(s)", nodes.len());
            }
            nodes.insert(id, element.clone());
        }
        id
    }

    fn element(&self, node: NodeId) -> Result<Element, DomError> {
        let element = self
            .nodes
            .borrow()
            .get(&node)
            .cloned()
            .ok_or(DomError::MissingNode(node))?;
        if !element.is_connected() {
            return Err(DomError::Detached(node));
        }
        Ok(element)
    }

    fn set_hook(&self, hook: Rc<dyn Fn(ListenerKind, NodeId)>) {
        *self.hook.borrow_mut() = Some(hook);
    }
}

impl Dom for WebDom {
    fn location(&self) -> Result<PageLocation, DomError> {
        let href = self.window.location().href().map_err(host_error)?;
        Ok(PageLocation::parse(&href))
    }

    fn title(&self) -> Result<String, DomError> {
        Ok(self.document.title())
    }

    fn query_all(&self, scope: Option<NodeId>, selector: &str) -> Result<Vec<NodeId>, DomError> {
        let list = match scope {
            Some(node) => self.element(node)?.query_selector_all(selector),
            None => self.document.query_selector_all(selector),
        }
        .map_err(host_error)?;
        Ok((0..list.length())
            .filter_map(|i| list.item(i))
            .filter_map(|n| n.dyn_into::<Element>().ok())
            .map(|el| self.register(&el))
            .collect())
    }

    fn matches(&self, node: NodeId, selector: &str) -> Result<bool, DomError> {
        self.element(node)?.matches(selector).map_err(host_error)
    }

    fn parent(&self, node: NodeId) -> Result<Option<NodeId>, DomError> {
        Ok(self
            .element(node)?
            .parent_element()
            .map(|parent| self.register(&parent)))
    }

    fn tag_name(&self, node: NodeId) -> Result<String, DomError> {
        Ok(self.element(node)?.tag_name().to_lowercase())
    }

    fn attribute(&self, node: NodeId, name: &str) -> Result<Option<String>, DomError> {
        Ok(self.element(node)?.get_attribute(name))
    }

    fn control(&self, node: NodeId) -> Result<ControlState, DomError> {
        let element = self.element(node)?;
        if let Some(input) = element.dyn_ref::<HtmlInputElement>() {
            return Ok(ControlState {
                input_type: input.type_().to_lowercase(),
                value: input.value(),
                checked: input.checked(),
                disabled: input.disabled(),
                multiple: input.multiple(),
                file_count: input.files().map(|f| f.length() as usize).unwrap_or(0),
                selected: Vec::new(),
            });
        }
        if let Some(select) = element.dyn_ref::<HtmlSelectElement>() {
            let options = select.selected_options();
            let selected = (0..options.length())
                .filter_map(|i| options.item(i))
                .filter_map(|o| o.dyn_into::<HtmlOptionElement>().ok())
                .map(|o| o.value())
                .collect();
            return Ok(ControlState {
                input_type: select.type_(),
                value: select.value(),
                disabled: select.disabled(),
                multiple: select.multiple(),
                selected,
                ..ControlState::default()
            });
        }
        if let Some(textarea) = element.dyn_ref::<HtmlTextAreaElement>() {
            return Ok(ControlState {
                input_type: "textarea".to_string(),
                value: textarea.value(),
                disabled: textarea.disabled(),
                ..ControlState::default()
            });
        }
        Ok(ControlState {
            input_type: element
                .get_attribute("type")
                .map(|t| t.to_lowercase())
                .unwrap_or_default(),
            disabled: element.has_attribute("disabled"),
            ..ControlState::default()
        })
    }

    fn text_content(&self, node: NodeId) -> Result<String, DomError> {
        Ok(self.element(node)?.text_content().unwrap_or_default())
    }

    fn read_global(&self, name: &str) -> Option<Value> {
        let value = Reflect::get(&self.window, &JsValue::from_str(name)).ok()?;
        if value.is_undefined() || value.is_null() {
            return None;
        }
        let json = String::from(js_sys::JSON::stringify(&value).ok()?);
        serde_json::from_str(&json).ok()
    }

    fn attach_listener(&mut self, node: NodeId, kind: ListenerKind) -> Result<(), DomError> {
        let element = self.element(node)?;
        let hook = Rc::clone(&self.hook);
        let closure = Closure::wrap(Box::new(move |_event: Event| {
            let current = hook.borrow().clone();
            if let Some(hook) = current {
                hook(kind, node);
            }
        }) as Box<dyn FnMut(Event)>);

        let options = AddEventListenerOptions::new();
        options.set_capture(true);
        let event = match kind {
            ListenerKind::Click => "click",
            ListenerKind::Press => "pointerdown",
        };
        element
            .add_event_listener_with_callback_and_add_event_listener_options(
                event,
                closure.as_ref().unchecked_ref(),
                &options,
            )
            .map_err(host_error)?;
        self.listeners.borrow_mut().push(closure);
        Ok(())
    }
}

/// `Date.now()` for both scheduling and timestamps.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsClock;

impl Clock for JsClock {
    fn now_ms(&self) -> u64 {
        js_sys::Date::now() as u64
    }

    fn epoch_ms(&self) -> i64 {
        js_sys::Date::now() as i64
    }
}

/// Sends messages through a host-supplied function such as
/// `chrome.runtime.sendMessage`. Rejected promises are swallowed.
pub struct JsChannel {
    send: Function,
    swallow: Closure<dyn FnMut(JsValue)>,
}

impl JsChannel {
    pub fn new(send: Function) -> Self {
        Self {
            send,
            swallow: Closure::wrap(Box::new(|e: JsValue| {
                debug!("Delivery rejected: {:?}", e.as_string());
            }) as Box<dyn FnMut(JsValue)>),
        }
    }
}

impl DeliveryChannel for JsChannel {
    fn send(&self, message: &DeliveryMessage) -> Result<(), ChannelError> {
        let json = serde_json::to_string(message)?;
        let payload = js_sys::JSON::parse(&json)
            .map_err(|e| ChannelError::Serialization(format!("{:?}", e)))?;
        match self.send.call1(&JsValue::NULL, &payload) {
            Ok(result) => {
                if let Ok(promise) = result.dyn_into::<Promise>() {
                    let _ = promise.catch(&self.swallow);
                }
                Ok(())
            }
            Err(e) => {
                let text = e.as_string().unwrap_or_else(|| format!("{:?}", e));
                if text.to_lowercase().contains("context invalidated") {
                    Err(ChannelError::ContextInvalidated)
                } else {
                    Err(ChannelError::Other(text))
                }
            }
        }
    }
}

type WebEngine = SharedEngine<WebDom, JsClock, JsChannel>;

struct Host {
    engine: WebEngine,
    armed: Cell<Option<u64>>,
    xhrs: XhrTable<JsXhr, HostObserver>,
    next_xhr: Cell<u32>,
    closures: RefCell<Vec<JsValue>>,
    observer: RefCell<Option<MutationObserver>>,
}

/// Arm a browser timer for the engine's next due task.
fn pump(host: &Rc<Host>) {
    let Some(due) = host.engine.with(|e| e.next_due()).flatten() else {
        return;
    };
    if host.armed.get().is_some_and(|armed| armed <= due) {
        return;
    }
    host.armed.set(Some(due));

    let weak = Rc::downgrade(host);
    let callback = Closure::once_into_js(move || {
        if let Some(host) = weak.upgrade() {
            host.armed.set(None);
            let now = JsClock.now_ms();
            host.engine.with(|e| e.run_due(now));
            pump(&host);
        }
    });
    let delay = due.saturating_sub(JsClock.now_ms()).min(i32::MAX as u64) as i32;
    if let Some(window) = web_sys::window() {
        let _ = window.set_timeout_with_callback_and_timeout_and_arguments_0(
            callback.unchecked_ref(),
            delay,
        );
    }
}

/// Feeds intercepted requests to the engine, then re-arms the timer for the
/// cross-check it may have scheduled.
#[derive(Clone)]
struct HostObserver(Weak<Host>);

impl RequestObserver for HostObserver {
    fn observe(&self, request: &ObservedRequest) {
        if let Some(host) = self.0.upgrade() {
            host.engine.observe(request);
            pump(&host);
        }
    }
}

/// One fetch call, carrying the caller's original arguments.
struct JsFetchCall<'a> {
    window: &'a Window,
    original: &'a Function,
    input: &'a JsValue,
    init: &'a JsValue,
}

impl FetchPrimitive for JsFetchCall<'_> {
    type Output = Result<JsValue, JsValue>;

    fn fetch(&self, _url: &str, _init: &FetchInit) -> Self::Output {
        self.original.call2(self.window, self.input, self.init)
    }
}

/// One XHR object; each call replays the caller's original arguments.
struct JsXhr {
    target: JsValue,
    pending: Option<(Function, Array)>,
    result: Option<Result<JsValue, JsValue>>,
}

impl JsXhr {
    fn apply(&mut self) {
        if let Some((original, args)) = self.pending.take() {
            self.result = Some(Reflect::apply(&original, &self.target, &args));
        }
    }
}

impl XhrPrimitive for JsXhr {
    fn open(&mut self, _method: &str, _url: &str) {
        self.apply();
    }

    fn send(&mut self, _body: Option<RequestBody>) {
        self.apply();
    }
}

fn js_string(value: &JsValue) -> Option<String> {
    value.as_string().filter(|s| !s.is_empty())
}

fn get_string(target: &JsValue, key: &str) -> Option<String> {
    Reflect::get(target, &JsValue::from_str(key))
        .ok()
        .as_ref()
        .and_then(js_string)
}

/// Convert a JS request body into the engine's shape without consuming it.
fn request_body(body: &JsValue) -> Option<RequestBody> {
    if body.is_undefined() || body.is_null() {
        return None;
    }
    if let Some(text) = body.as_string() {
        return Some(RequestBody::Text(text));
    }
    if let Some(params) = body.dyn_ref::<UrlSearchParams>() {
        return Some(RequestBody::Text(String::from(params.to_string())));
    }
    if body.dyn_ref::<FormData>().is_some() {
        let mut entries = Vec::new();
        if let Ok(Some(iter)) = js_sys::try_iter(body) {
            for entry in iter.flatten() {
                let pair = Array::from(&entry);
                let Some(key) = pair.get(0).as_string() else {
                    continue;
                };
                let value = pair.get(1);
                let value = match value.as_string() {
                    Some(text) => FormDataValue::Text(text),
                    None => FormDataValue::File {
                        name: get_string(&value, "name").unwrap_or_default(),
                    },
                };
                entries.push((key, value));
            }
        }
        return Some(RequestBody::FormData(entries));
    }
    Some(RequestBody::Opaque)
}

fn fetch_request(input: &JsValue, init: &JsValue) -> (String, FetchInit) {
    let url = js_string(input)
        .or_else(|| get_string(input, "url"))
        .or_else(|| get_string(input, "href"))
        .unwrap_or_default();
    let method = get_string(init, "method")
        .or_else(|| get_string(input, "method"))
        .unwrap_or_default();
    let body = Reflect::get(init, &JsValue::from_str("body"))
        .ok()
        .and_then(|b| request_body(&b));
    (url, FetchInit::new(&method, body))
}

fn install_fetch(window: &Window, host: &Rc<Host>) -> Result<(), JsValue> {
    let original: Function = Reflect::get(window, &JsValue::from_str("fetch"))?.dyn_into()?;
    let observer = HostObserver(Rc::downgrade(host));
    let win = window.clone();
    let wrapper = Closure::wrap(Box::new(move |input: JsValue, init: JsValue| {
        let (url, parsed) = if init.is_object() {
            fetch_request(&input, &init)
        } else {
            fetch_request(&input, &JsValue::UNDEFINED)
        };
        let call = JsFetchCall {
            window: &win,
            original: &original,
            input: &input,
            init: &init,
        };
        InterceptedFetch::new(call, &observer).fetch(&url, &parsed)
    }) as Box<dyn FnMut(JsValue, JsValue) -> Result<JsValue, JsValue>>);

    Reflect::set(window, &JsValue::from_str("fetch"), wrapper.as_ref())?;
    host.closures.borrow_mut().push(wrapper.into_js_value());
    Ok(())
}

fn xhr_id(host: &Host, target: &JsValue) -> u32 {
    if let Some(id) = Reflect::get(target, &JsValue::from_str(XHR_ID_KEY))
        .ok()
        .and_then(|v| v.as_f64())
    {
        return id as u32;
    }
    let id = host.next_xhr.get();
    host.next_xhr.set(id.wrapping_add(1));
    let _ = Reflect::set(target, &JsValue::from_str(XHR_ID_KEY), &JsValue::from_f64(id as f64));
    id
}

fn fresh_xhr(host: &Rc<Host>, target: &JsValue) -> InterceptedXhr<JsXhr, HostObserver> {
    InterceptedXhr::new(
        JsXhr {
            target: target.clone(),
            pending: None,
            result: None,
        },
        HostObserver(Rc::downgrade(host)),
    )
}

fn install_xhr(window: &Window, host: &Rc<Host>) -> Result<(), JsValue> {
    let class = Reflect::get(window, &JsValue::from_str("XMLHttpRequest"))?;
    let proto = Reflect::get(&class, &JsValue::from_str("prototype"))?;
    let original_open: Function = Reflect::get(&proto, &JsValue::from_str("open"))?.dyn_into()?;
    let original_send: Function = Reflect::get(&proto, &JsValue::from_str("send"))?.dyn_into()?;

    let weak = Rc::downgrade(host);
    let open = Closure::wrap(Box::new(move |this: JsValue, args: Array| {
        let Some(host) = weak.upgrade() else {
            return Reflect::apply(&original_open, &this, &args);
        };
        let id = xhr_id(&host, &this);
        let method = args.get(0).as_string().unwrap_or_default();
        let url = args.get(1).as_string().unwrap_or_default();
        // Out of the table while the native call runs: `open` fires
        // readystatechange synchronously and its handlers may open another.
        let mut xhr = host.xhrs.take(id).unwrap_or_else(|| fresh_xhr(&host, &this));
        xhr.inner_mut().pending = Some((original_open.clone(), args));
        xhr.open(&method, &url);
        let result = xhr.inner_mut().result.take().unwrap_or(Ok(JsValue::UNDEFINED));
        if result.is_ok() {
            host.xhrs.put(id, xhr);
        }
        result
    }) as Box<dyn FnMut(JsValue, Array) -> Result<JsValue, JsValue>>);

    let weak = Rc::downgrade(host);
    let send = Closure::wrap(Box::new(move |this: JsValue, args: Array| {
        let Some(host) = weak.upgrade() else {
            return Reflect::apply(&original_send, &this, &args);
        };
        let id = xhr_id(&host, &this);
        let mut xhr = host.xhrs.take(id).unwrap_or_else(|| fresh_xhr(&host, &this));
        let body = request_body(&args.get(0));
        xhr.inner_mut().pending = Some((original_send.clone(), args));
        xhr.send(body);
        xhr.inner_mut().result.take().unwrap_or(Ok(JsValue::UNDEFINED))
    }) as Box<dyn FnMut(JsValue, Array) -> Result<JsValue, JsValue>>);

    wrap_method(&proto, "open", open.as_ref().unchecked_ref());
    wrap_method(&proto, "send", send.as_ref().unchecked_ref());
    let mut closures = host.closures.borrow_mut();
    closures.push(open.into_js_value());
    closures.push(send.into_js_value());
    Ok(())
}

fn install_submit_listener(document: &Document, host: &Rc<Host>) -> Result<(), JsValue> {
    let weak = Rc::downgrade(host);
    let listener = Closure::wrap(Box::new(move |event: Event| {
        let Some(host) = weak.upgrade() else {
            return;
        };
        let Some(form) = event.target().and_then(|t| t.dyn_into::<Element>().ok()) else {
            return;
        };
        host.engine.with(|e| {
            let id = e.dom().register(&form);
            e.on_submit(id);
        });
        pump(&host);
    }) as Box<dyn FnMut(Event)>);

    let options = AddEventListenerOptions::new();
    options.set_capture(true);
    document.add_event_listener_with_callback_and_add_event_listener_options(
        "submit",
        listener.as_ref().unchecked_ref(),
        &options,
    )?;
    host.closures.borrow_mut().push(listener.into_js_value());
    Ok(())
}

fn install_mutation_observer(document: &Document, host: &Rc<Host>) -> Result<(), JsValue> {
    let weak = Rc::downgrade(host);
    let callback = Closure::wrap(Box::new(move |_records: Array, _observer: JsValue| {
        if let Some(host) = weak.upgrade() {
            host.engine.with(|e| e.on_mutation());
            pump(&host);
        }
    }) as Box<dyn FnMut(Array, JsValue)>);

    let observer = MutationObserver::new(callback.as_ref().unchecked_ref())?;
    let init = MutationObserverInit::new();
    init.set_child_list(true);
    init.set_subtree(true);
    init.set_attributes(true);
    if let Some(root) = document.document_element() {
        observer.observe_with_options(&root, &init)?;
    }
    *host.observer.borrow_mut() = Some(observer);
    host.closures.borrow_mut().push(callback.into_js_value());
    Ok(())
}

/// Capture engine bound to the current page.
#[wasm_bindgen]
pub struct FormCapture {
    host: Rc<Host>,
}

#[wasm_bindgen]
impl FormCapture {
    /// `send` receives each `FORM_SUBMISSION` message. `config_json` is an
    /// optional `CaptureConfig` as JSON; missing keys keep their defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(send: Function, config_json: Option<String>) -> Result<FormCapture, JsValue> {
        console_error_panic_hook::set_once();

        let config: CaptureConfig = match config_json.as_deref() {
            Some(json) if !json.trim().is_empty() => serde_json::from_str(json)
                .map_err(|e| JsValue::from_str(&format!("Failed to parse config: {}", e)))?,
            _ => CaptureConfig::default(),
        };
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window"))?;
        let document = window
            .document()
            .ok_or_else(|| JsValue::from_str("No document"))?;

        let network_enabled = config.network.enabled;
        let dom = WebDom::new(window.clone(), document.clone());
        let engine = SharedEngine::new(CaptureEngine::new(
            dom,
            JsClock,
            JsChannel::new(send),
            config,
        ));
        let host = Rc::new(Host {
            engine,
            armed: Cell::new(None),
            xhrs: XhrTable::new(MAX_OPEN_XHRS),
            next_xhr: Cell::new(0),
            closures: RefCell::new(Vec::new()),
            observer: RefCell::new(None),
        });

        let weak = Rc::downgrade(&host);
        let hook: Rc<dyn Fn(ListenerKind, NodeId)> = Rc::new(move |kind, node| {
            if let Some(host) = weak.upgrade() {
                host.engine.with(|e| match kind {
                    ListenerKind::Click => e.on_click(node),
                    ListenerKind::Press => e.on_press(node),
                });
                pump(&host);
            }
        });
        host.engine.with(|e| e.dom().set_hook(hook));

        install_submit_listener(&document, &host)?;
        install_mutation_observer(&document, &host)?;
        if network_enabled {
            install_fetch(&window, &host)?;
            install_xhr(&window, &host)?;
        }
        host.engine.with(|e| e.start());
        pump(&host);

        Ok(FormCapture { host })
    }

    /// Submissions delivered so far.
    #[wasm_bindgen(js_name = sentCount)]
    pub fn sent_count(&self) -> usize {
        self.host.engine.with(|e| e.dispatcher().sent()).unwrap_or(0)
    }

    /// Controls currently instrumented as submit triggers.
    #[wasm_bindgen(js_name = watchedCount)]
    pub fn watched_count(&self) -> usize {
        self.host
            .engine
            .with(|e| e.context().watcher.registry().len())
            .unwrap_or(0)
    }

    #[wasm_bindgen(js_name = getVersion)]
    pub fn get_version() -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }
}
