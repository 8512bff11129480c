//! Decorators around the page's request primitives.
//!
//! Contract: the wrapped primitive is always called, with exactly the
//! arguments it was given, and its result is returned untouched. Observation
//! happens first and can neither fail nor change the call.

use super::{ObservedRequest, RequestBody};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;
use tracing::debug;

/// Receives every candidate request (POST/PUT with a body).
pub trait RequestObserver {
    fn observe(&self, request: &ObservedRequest);
}

impl<T: RequestObserver + ?Sized> RequestObserver for &T {
    fn observe(&self, request: &ObservedRequest) {
        (**self).observe(request)
    }
}

impl<T: RequestObserver + ?Sized> RequestObserver for Rc<T> {
    fn observe(&self, request: &ObservedRequest) {
        (**self).observe(request)
    }
}

fn observe_quietly<O: RequestObserver + ?Sized>(observer: &O, request: &ObservedRequest) {
    if !request.is_candidate() {
        return;
    }
    if catch_unwind(AssertUnwindSafe(|| observer.observe(request))).is_err() {
        debug!("Request observer panicked for {} {}", request.method, request.url);
    }
}

/// The options half of a fetch-style call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchInit {
    /// Empty means GET.
    pub method: String,
    pub body: Option<RequestBody>,
}

impl FetchInit {
    pub fn new(method: &str, body: Option<RequestBody>) -> Self {
        Self {
            method: method.to_string(),
            body,
        }
    }

    fn effective_method(&self) -> &str {
        if self.method.is_empty() {
            "GET"
        } else {
            &self.method
        }
    }
}

/// A fetch-style request function: `(url, options) -> response`.
pub trait FetchPrimitive {
    type Output;

    fn fetch(&self, url: &str, init: &FetchInit) -> Self::Output;
}

pub struct InterceptedFetch<P, O> {
    inner: P,
    observer: O,
}

impl<P: FetchPrimitive, O: RequestObserver> InterceptedFetch<P, O> {
    pub fn new(inner: P, observer: O) -> Self {
        Self { inner, observer }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: FetchPrimitive, O: RequestObserver> FetchPrimitive for InterceptedFetch<P, O> {
    type Output = P::Output;

    fn fetch(&self, url: &str, init: &FetchInit) -> Self::Output {
        if init.body.is_some() {
            let request = ObservedRequest::new(init.effective_method(), url, init.body.clone());
            observe_quietly(&self.observer, &request);
        }
        self.inner.fetch(url, init)
    }
}

/// The `open`/`send` pair of a request object.
pub trait XhrPrimitive {
    fn open(&mut self, method: &str, url: &str);

    fn send(&mut self, body: Option<RequestBody>);
}

/// Remembers what `open` was given so `send` can report the full request.
pub struct InterceptedXhr<X, O> {
    inner: X,
    observer: O,
    opened: Option<(String, String)>,
}

impl<X: XhrPrimitive, O: RequestObserver> InterceptedXhr<X, O> {
    pub fn new(inner: X, observer: O) -> Self {
        Self {
            inner,
            observer,
            opened: None,
        }
    }

    pub fn inner(&self) -> &X {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut X {
        &mut self.inner
    }
}

impl<X: XhrPrimitive, O: RequestObserver> XhrPrimitive for InterceptedXhr<X, O> {
    fn open(&mut self, method: &str, url: &str) {
        self.opened = Some((method.to_string(), url.to_string()));
        self.inner.open(method, url);
    }

    fn send(&mut self, body: Option<RequestBody>) {
        if let (Some((method, url)), Some(_)) = (&self.opened, &body) {
            let request = ObservedRequest::new(method, url, body.clone());
            observe_quietly(&self.observer, &request);
        }
        self.inner.send(body);
    }
}

/// Request objects between `open` and `send`, keyed by a host-assigned id.
///
/// Callers take an entry out before running its primitive and put it back
/// afterwards, so page code fired synchronously from inside `open` or `send`
/// can use the table again. Ids are handed out in increasing order; past
/// `capacity` the oldest opened-but-never-sent entries are dropped.
pub struct XhrTable<X, O> {
    entries: RefCell<BTreeMap<u32, InterceptedXhr<X, O>>>,
    capacity: usize,
}

impl<X: XhrPrimitive, O: RequestObserver> XhrTable<X, O> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RefCell::new(BTreeMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn take(&self, id: u32) -> Option<InterceptedXhr<X, O>> {
        self.entries.borrow_mut().remove(&id)
    }

    pub fn put(&self, id: u32, xhr: InterceptedXhr<X, O>) {
        let mut entries = self.entries.borrow_mut();
        entries.insert(id, xhr);
        while entries.len() > self.capacity {
            entries.pop_first();
            debug!("Dropping request object opened but never sent");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(RefCell<Vec<ObservedRequest>>);

    impl RequestObserver for Recorder {
        fn observe(&self, request: &ObservedRequest) {
            self.0.borrow_mut().push(request.clone());
        }
    }

    struct Exploding;

    impl RequestObserver for Exploding {
        fn observe(&self, _: &ObservedRequest) {
            panic!("observer bug");
        }
    }

    #[derive(Default)]
    struct EchoFetch(RefCell<Vec<(String, FetchInit)>>);

    impl FetchPrimitive for EchoFetch {
        type Output = String;

        fn fetch(&self, url: &str, init: &FetchInit) -> String {
            self.0.borrow_mut().push((url.to_string(), init.clone()));
            format!("response:{}", url)
        }
    }

    #[derive(Default)]
    struct FakeXhr {
        calls: Vec<String>,
    }

    impl XhrPrimitive for FakeXhr {
        fn open(&mut self, method: &str, url: &str) {
            self.calls.push(format!("open {} {}", method, url));
        }

        fn send(&mut self, body: Option<RequestBody>) {
            self.calls.push(format!("send {:?}", body));
        }
    }

    #[test]
    fn fetch_delegates_unchanged_and_observes_posts() {
        let recorder = Recorder::default();
        let fetch = InterceptedFetch::new(EchoFetch::default(), &recorder);
        let init = FetchInit::new("POST", Some(RequestBody::Text("a=1".into())));

        assert_eq!(fetch.fetch("https://x.test/send", &init), "response:https://x.test/send");
        assert_eq!(fetch.fetch("https://x.test/page", &FetchInit::default()), "response:https://x.test/page");

        let seen = recorder.0.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].url, "https://x.test/send");
        assert_eq!(fetch.inner().0.borrow()[0], ("https://x.test/send".to_string(), init));
    }

    #[test]
    fn observer_panic_does_not_reach_the_caller() {
        let fetch = InterceptedFetch::new(EchoFetch::default(), Exploding);
        let init = FetchInit::new("PUT", Some(RequestBody::Text("{}".into())));
        assert_eq!(fetch.fetch("https://x.test/", &init), "response:https://x.test/");
    }

    #[test]
    fn xhr_reports_open_arguments_at_send() {
        let recorder = Recorder::default();
        let mut xhr = InterceptedXhr::new(FakeXhr::default(), &recorder);
        xhr.open("POST", "https://docs.google.com/forms/d/e/x/formResponse");
        xhr.send(Some(RequestBody::Text("entry.1=a".into())));

        assert_eq!(xhr.inner().calls.len(), 2);
        assert!(xhr.inner().calls[0].starts_with("open POST"));
        let seen = recorder.0.borrow();
        assert_eq!(seen[0].method, "POST");
        assert_eq!(seen[0].body, Some(RequestBody::Text("entry.1=a".into())));
    }

    #[test]
    fn xhr_get_is_not_observed() {
        let recorder = Recorder::default();
        let mut xhr = InterceptedXhr::new(FakeXhr::default(), &recorder);
        xhr.open("GET", "/data");
        xhr.send(None);
        assert!(recorder.0.borrow().is_empty());
        assert_eq!(xhr.inner().calls.len(), 2);
    }

    #[test]
    fn xhr_table_drops_oldest_unsent_entries() {
        let recorder = Recorder::default();
        let table = XhrTable::new(2);
        for id in 1..=3 {
            let mut xhr = InterceptedXhr::new(FakeXhr::default(), &recorder);
            xhr.open("POST", &format!("/form/{}", id));
            table.put(id, xhr);
        }
        assert_eq!(table.len(), 2);
        assert!(table.take(1).is_none());

        let mut third = table.take(3).expect("entry 3");
        third.send(Some(RequestBody::Text("a=1".into())));
        assert_eq!(recorder.0.borrow()[0].url, "/form/3");
        assert_eq!(table.len(), 1);
    }
}
