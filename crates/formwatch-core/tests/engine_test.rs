use formwatch_common::{CaptureConfig, FieldValue, SubmissionSource};
use formwatch_core::dom::ListenerKind;
use formwatch_core::{
    CaptureEngine, Dom, ManualClock, MemoryChannel, MemoryDom, NodeId, NodeSpec, ObservedRequest,
    RequestBody,
};

type Engine = CaptureEngine<MemoryDom, ManualClock, MemoryChannel>;

fn engine_with(dom: MemoryDom, config: CaptureConfig) -> (Engine, ManualClock, MemoryChannel) {
    let clock = ManualClock::default();
    let channel = MemoryChannel::new();
    let engine = CaptureEngine::new(dom, clock.clone(), channel.clone(), config);
    (engine, clock, channel)
}

fn engine(dom: MemoryDom) -> (Engine, ManualClock, MemoryChannel) {
    engine_with(dom, CaptureConfig::default())
}

fn advance_to(engine: &mut Engine, clock: &ManualClock, t: u64) {
    clock.set(t);
    engine.run_due(t);
}

fn contact_form(url: &str) -> (MemoryDom, NodeId) {
    let mut dom = MemoryDom::new(url, "Contact us");
    let form = dom.append(
        dom.root(),
        NodeSpec::new("form").attr("action", "/contact/send").children([
            NodeSpec::new("input").attr("name", "email").value("a@b.com"),
            NodeSpec::new("input")
                .attr("name", "password")
                .attr("type", "password")
                .value("x"),
            NodeSpec::new("button").attr("type", "submit").text("Send"),
        ]),
    );
    (dom, form)
}

#[test]
fn native_submit_captures_without_password() {
    let (dom, form) = contact_form("https://example.com/contact");
    let (mut engine, _clock, channel) = engine(dom);
    engine.on_submit(form);

    let sent = channel.submissions();
    assert_eq!(sent.len(), 1);
    let submission = &sent[0];
    assert_eq!(submission.source, SubmissionSource::Native);
    assert_eq!(submission.url, "https://example.com/contact");
    assert_eq!(submission.action, "https://example.com/contact/send");
    assert_eq!(submission.title, "Contact us");
    assert_eq!(submission.timestamp, "2024-01-01T00:00:00.000Z");
    assert_eq!(submission.fields.len(), 1);
    assert_eq!(submission.fields.get("email"), Some(&FieldValue::from("a@b.com")));
}

#[test]
fn login_page_is_never_captured() {
    let (dom, form) = contact_form("https://example.com/login?next=/");
    let (mut engine, clock, channel) = engine(dom);
    engine.start();
    engine.on_submit(form);
    let button = engine.dom().query_all(None, "button").unwrap()[0];
    engine.on_click(button);
    engine.on_request(&ObservedRequest::new(
        "POST",
        "https://example.com/api/contact",
        Some(RequestBody::Text("email=a%40b.com".into())),
    ));
    advance_to(&mut engine, &clock, 5_000);
    assert!(channel.messages().is_empty());
}

#[test]
fn sensitive_action_url_vetoes() {
    let mut dom = MemoryDom::new("https://example.com/account", "");
    let form = dom.append(
        dom.root(),
        NodeSpec::new("form")
            .attr("action", "https://pay.example.com/checkout")
            .child(NodeSpec::new("input").attr("name", "note").value("gift")),
    );
    let (mut engine, _clock, channel) = engine(dom);
    engine.on_submit(form);
    assert!(channel.messages().is_empty());
}

#[test]
fn google_form_response_post() {
    let dom = MemoryDom::new("https://docs.google.com/forms/d/e/abc/viewform", "Survey");
    let (mut engine, _clock, channel) = engine(dom);
    engine.on_request(&ObservedRequest::new(
        "POST",
        "https://docs.google.com/forms/d/e/abc/formResponse",
        Some(RequestBody::Text("entry.111=Foo&fvv=1&pageHistory=0".into())),
    ));

    let sent = channel.submissions();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].source, SubmissionSource::GoogleForms);
    assert_eq!(sent[0].action, "https://docs.google.com/forms/d/e/abc/formResponse");
    assert_eq!(sent[0].fields.get("111"), Some(&FieldValue::from("Foo")));
    assert_eq!(sent[0].fields.len(), 1);
    assert_eq!(engine.pending_tasks(), 1);
}

#[test]
fn cross_check_runs_provider_extraction() {
    let mut dom = MemoryDom::new("https://docs.google.com/forms/d/e/abc/viewform", "Survey");
    dom.append(
        dom.root(),
        NodeSpec::new("div").attr("role", "listitem").children([
            NodeSpec::new("div").attr("role", "heading").text("Name"),
            NodeSpec::new("input").value("Ada"),
        ]),
    );
    let (mut engine, clock, channel) = engine(dom);
    engine.on_request(&ObservedRequest::new(
        "POST",
        "/forms/d/e/abc/formResponse",
        Some(RequestBody::Text("entry.1=Ada".into())),
    ));
    assert_eq!(engine.next_due(), Some(250));
    advance_to(&mut engine, &clock, 250);

    let sent = channel.submissions();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].fields.get("1"), Some(&FieldValue::from("Ada")));
    assert_eq!(sent[1].fields.get("Name"), Some(&FieldValue::from("Ada")));
    assert!(sent.iter().all(|s| s.source == SubmissionSource::GoogleForms));
}

#[test]
fn checkbox_group_becomes_sequence() {
    let mut dom = MemoryDom::new("https://example.com/prefs", "");
    let form = dom.append(
        dom.root(),
        NodeSpec::new("form").children(["a", "b"].map(|v| {
            NodeSpec::new("input")
                .attr("type", "checkbox")
                .attr("name", "interests")
                .attr("value", v)
                .checked(true)
        })),
    );
    let (mut engine, _clock, channel) = engine(dom);
    engine.on_submit(form);
    assert_eq!(
        channel.submissions()[0].fields.get("interests"),
        Some(&FieldValue::from(vec!["a", "b"]))
    );
}

#[test]
fn third_attempt_is_dispatched_after_two_empty_ones() {
    let dom = MemoryDom::new("https://docs.google.com/forms/d/e/abc/viewform", "");
    let mut config = CaptureConfig::default();
    config.watcher.click_delays_ms = vec![100];
    let (mut engine, clock, channel) = engine_with(dom, config);

    engine.on_click(0);
    // Attempts run at 100, 400 and 1000.
    advance_to(&mut engine, &clock, 450);
    assert!(channel.messages().is_empty());

    let root = engine.dom().root();
    engine.dom_mut().append(
        root,
        NodeSpec::new("div").attr("role", "listitem").children([
            NodeSpec::new("div").attr("role", "heading").text("Feedback"),
            NodeSpec::new("textarea").text("Great"),
        ]),
    );
    advance_to(&mut engine, &clock, 999);
    assert!(channel.messages().is_empty());

    advance_to(&mut engine, &clock, 1_000);
    let sent = channel.submissions();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].timestamp, "2024-01-01T00:00:01.000Z");
    assert_eq!(sent[0].fields.get("Feedback"), Some(&FieldValue::from("Great")));
    assert_eq!(engine.context().retry.in_flight(), 0);
}

#[test]
fn exhausted_chain_falls_back_to_salvage() {
    let mut dom = MemoryDom::new("https://forms.office.com/r/abc", "");
    dom.append(
        dom.root(),
        NodeSpec::new("div")
            .attr("role", "combobox")
            .child(NodeSpec::new("input").attr("aria-label", "Colour").value("Blue")),
    );
    let mut config = CaptureConfig::default();
    config.watcher.click_delays_ms = vec![0];
    let (mut engine, clock, channel) = engine_with(dom.clone(), config.clone());
    engine.on_click(0);
    advance_to(&mut engine, &clock, 10_000);

    let sent = channel.submissions();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].source, SubmissionSource::MicrosoftForms);
    assert_eq!(sent[0].fields.get("Colour"), Some(&FieldValue::from("Blue")));

    config.retry.salvage = false;
    let (mut engine, clock, channel) = engine_with(dom, config);
    engine.on_click(0);
    advance_to(&mut engine, &clock, 10_000);
    assert!(channel.messages().is_empty());
    assert_eq!(engine.context().retry.in_flight(), 0);
}

#[test]
fn empty_page_never_dispatches() {
    let dom = MemoryDom::new("https://forms.clickup.com/f/abc", "");
    let (mut engine, clock, channel) = engine(dom);
    engine.on_click(0);
    engine.on_press(0);
    advance_to(&mut engine, &clock, 10_000);
    assert!(channel.messages().is_empty());
}

#[test]
fn watched_button_click_captures_once() {
    let (dom, _form) = contact_form("https://example.com/contact");
    let (mut engine, clock, channel) = engine(dom);
    engine.start();
    let button = engine.dom().query_all(None, "button").unwrap()[0];
    assert_eq!(
        engine.dom().listeners(button),
        &[ListenerKind::Click, ListenerKind::Press]
    );

    engine.on_press(button);
    engine.on_click(button);
    advance_to(&mut engine, &clock, 700);
    let sent = channel.submissions();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].action, "https://example.com/contact/send");
}

#[test]
fn late_buttons_found_by_mutation_and_poll() {
    let dom = MemoryDom::new("https://example.com/", "");
    let (mut engine, clock, _channel) = engine(dom);
    engine.start();
    assert_eq!(engine.context().watcher.registry().len(), 0);

    let root = engine.dom().root();
    engine
        .dom_mut()
        .append(root, NodeSpec::new("button").attr("type", "submit"));
    engine.on_mutation();
    assert_eq!(engine.context().watcher.registry().len(), 1);

    engine
        .dom_mut()
        .append(root, NodeSpec::new("div").attr("role", "button").text("Submit"));
    advance_to(&mut engine, &clock, 1_500);
    assert_eq!(engine.context().watcher.registry().len(), 2);

    engine.on_mutation();
    advance_to(&mut engine, &clock, 3_000);
    assert_eq!(engine.context().watcher.registry().len(), 2);
}

#[test]
fn zero_rescan_interval_keeps_polling_without_spinning() {
    let mut config = CaptureConfig::default();
    config.watcher.rescan_interval_ms = 0;
    let (mut engine, clock, _channel) = engine_with(MemoryDom::new("https://example.com/", ""), config);
    engine.start();

    let root = engine.dom().root();
    engine
        .dom_mut()
        .append(root, NodeSpec::new("div").attr("role", "button").text("Send"));
    clock.set(5_000);
    assert_eq!(engine.run_due(5_000), 1);
    assert_eq!(engine.context().watcher.registry().len(), 1);
    assert_eq!(engine.next_due(), Some(5_001));
}

#[test]
fn detached_form_yields_no_dispatch() {
    let (mut dom, form) = contact_form("https://example.com/contact");
    dom.remove(form);
    let (mut engine, clock, channel) = engine(dom);
    engine.on_submit(form);
    advance_to(&mut engine, &clock, 10_000);
    assert!(channel.messages().is_empty());
}

#[test]
fn closed_channel_is_tolerated() {
    let (dom, form) = contact_form("https://example.com/contact");
    let (mut engine, _clock, channel) = engine(dom);
    channel.close();
    engine.on_submit(form);
    engine.on_submit(form);
    assert_eq!(engine.dispatcher().sent(), 0);
}

#[test]
fn delivery_message_shape() {
    let (dom, form) = contact_form("https://example.com/contact");
    let (mut engine, _clock, channel) = engine(dom);
    engine.on_submit(form);
    let json = serde_json::to_value(&channel.messages()[0]).unwrap();
    assert_eq!(json["type"], "FORM_SUBMISSION");
    assert_eq!(json["data"]["source"], "native");
    assert_eq!(json["data"]["fields"]["email"], "a@b.com");
}
