//! 整页翻译集成测试
//!
//! 从 HTML 到请求，再从响应写回 DOM 的端到端行为

mod common;

use moxie::network::{LoopbackTransport, ResponseBlock, TranslateResponse};
use moxie::parsers::html::dom::{get_node_attr, has_class, text_content};
use moxie::parsers::html::serialize_node;
use moxie::translation::config::constants;
use moxie::translation::error::helpers;
use moxie::translation::{block_hash, JliffItem, MoxieConfig, RuleSet};
use moxie::{Completion, Moxie};

use common::{moxie_with, HtmlTestHelper, ScriptedTransport, PAGE_URL};

#[test]
fn test_simple_paragraph_request_shape() {
    let dom = HtmlTestHelper::parse(r#"<html><body><p>Click <a href="x">here</a> for more!</p></body></html>"#);
    let transport = ScriptedTransport::new();
    let mut moxie = moxie_with(&transport, MoxieConfig::default(), RuleSet::default());

    let completion = moxie.translate_page(&dom);
    assert!(completion.is_success());

    let requests = transport.requests.borrow();
    assert_eq!(requests.len(), 1);
    let block = &requests[0].text[0];
    assert_eq!(
        block.source,
        vec![
            JliffItem::text("Click "),
            JliffItem::start(1),
            JliffItem::text("here"),
            JliffItem::end(1),
            JliffItem::text(" for more!"),
        ]
    );
    assert_eq!(block.block_hash, block_hash("Click <x>here</x> for more!"));
    assert_eq!(requests[0].url, PAGE_URL);

    let p = HtmlTestHelper::find(&dom, &["p"]);
    assert_eq!(text_content(&p), "CLICK HERE FOR MORE!");
    let a = HtmlTestHelper::find(&dom, &["p", "a"]);
    assert_eq!(get_node_attr(&a, "href").as_deref(), Some("x"));
}

#[test]
fn test_loopback_round_trip_preserves_body() {
    let dom = HtmlTestHelper::parse(&HtmlTestHelper::create_product_page());
    let before = serialize_node(&dom.body().unwrap());

    let mut moxie = Moxie::new(MoxieConfig::default(), RuleSet::default(), PAGE_URL, LoopbackTransport);
    let completion = moxie.translate_page(&dom);

    let report = completion.report().expect("loopback translation should complete");
    assert!(report.applied > 0);
    assert_eq!(report.failed, 0);
    assert_eq!(serialize_node(&dom.body().unwrap()), before);
}

#[test]
fn test_numbers_do_not_change_block_hash() {
    let dom = HtmlTestHelper::parse("<html><body><p>Order 42 shipped</p><p>Order 99 shipped</p></body></html>");
    let transport = ScriptedTransport::new();
    let mut moxie = moxie_with(&transport, MoxieConfig::default(), RuleSet::default());
    moxie.translate_page(&dom);

    // 同一哈希只发送一次，两处各自写回自己的数字
    assert_eq!(transport.sent_blocks(), 1);
    let body = dom.body().unwrap();
    assert_eq!(text_content(&body), "ORDER 42 SHIPPEDORDER 99 SHIPPED");
}

#[test]
fn test_attribute_side_block() {
    let dom = HtmlTestHelper::parse(&HtmlTestHelper::create_product_page());
    let transport = ScriptedTransport::new();
    let mut moxie = moxie_with(&transport, MoxieConfig::default(), RuleSet::default());
    moxie.translate_page(&dom);

    let button = HtmlTestHelper::find(&dom, &["button"]);
    assert_eq!(get_node_attr(&button, "title").as_deref(), Some("ADD TO YOUR CART"));
    assert_eq!(text_content(&button), "ADD TO CART");
}

#[test]
fn test_cache_reused_for_identical_page() {
    let transport = ScriptedTransport::new();
    let mut moxie = moxie_with(&transport, MoxieConfig::default(), RuleSet::default());

    let first = HtmlTestHelper::parse(&HtmlTestHelper::create_product_page());
    moxie.translate_page(&first);
    let sent = transport.sent_blocks();
    assert_eq!(transport.request_count(), 1);

    let second = HtmlTestHelper::parse(&HtmlTestHelper::create_product_page());
    let completion = moxie.translate_page(&second);
    let report = completion.report().unwrap();
    assert_eq!(transport.request_count(), 1);
    assert_eq!(report.from_cache, sent);
    assert_eq!(
        text_content(&second.body().unwrap()),
        text_content(&first.body().unwrap())
    );
}

#[test]
fn test_pretranslation_consulted_before_request() {
    let transport = ScriptedTransport::new();
    transport
        .pretranslation
        .borrow_mut()
        .insert(block_hash("Hello there"), vec![JliffItem::text("Bonjour")]);
    let mut moxie = moxie_with(&transport, MoxieConfig::default(), RuleSet::default());

    let dom = HtmlTestHelper::parse("<html><body><p>Hello there</p></body></html>");
    let completion = moxie.translate_page(&dom);

    assert_eq!(transport.pretranslation_fetches.get(), 1);
    assert_eq!(transport.request_count(), 0);
    assert_eq!(completion.report().unwrap().from_pretranslation, 1);
    assert_eq!(text_content(&dom.body().unwrap()), "Bonjour");
}

#[test]
fn test_block_override_splits_custom_element() {
    let html = "<html><body><p>Intro <custom-card>Card body text</custom-card> outro</p></body></html>";

    let transport = ScriptedTransport::new();
    let mut moxie = moxie_with(&transport, MoxieConfig::default(), RuleSet::default());
    moxie.translate_page(&HtmlTestHelper::parse(html));
    assert_eq!(transport.sent_blocks(), 1);

    let rules = RuleSet::from_json(r#"{"set_as_block_tag": [{"x": "custom-card"}]}"#).unwrap();
    let transport = ScriptedTransport::new();
    let mut moxie = moxie_with(&transport, MoxieConfig::default(), rules);
    let dom = HtmlTestHelper::parse(html);
    moxie.translate_page(&dom);

    let requests = transport.requests.borrow();
    let hashes: Vec<&str> = requests[0].text.iter().map(|b| b.block_hash.as_str()).collect();
    assert_eq!(hashes.len(), 2);
    assert!(hashes.contains(&block_hash("Intro <x></x> outro").as_str()));
    assert!(hashes.contains(&block_hash("Card body text").as_str()));
    assert_eq!(text_content(&dom.body().unwrap()), "INTRO CARD BODY TEXT OUTRO");
}

#[test]
fn test_no_translate_marker_is_respected() {
    let dom = HtmlTestHelper::parse(
        r#"<html><body><p>Call <span class="notranslate">Acme Corp</span> now</p></body></html>"#,
    );
    let transport = ScriptedTransport::new();
    let mut moxie = moxie_with(&transport, MoxieConfig::default(), RuleSet::default());
    moxie.translate_page(&dom);

    assert_eq!(text_content(&dom.body().unwrap()), "CALL Acme Corp NOW");
}

#[test]
fn test_missing_object_key_leaves_block_untouched() {
    let dom = HtmlTestHelper::parse(r#"<html><body><p>Click <a href="x">here</a> for more!</p></body></html>"#);
    let transport = ScriptedTransport::new();
    transport.push_response(Ok(TranslateResponse {
        text: vec![ResponseBlock {
            target: vec![
                JliffItem::text("Cliquez "),
                JliffItem::start(9),
                JliffItem::text("ici"),
                JliffItem::end(9),
            ],
        }],
        ami: Vec::new(),
    }));
    let mut moxie = moxie_with(&transport, MoxieConfig::default(), RuleSet::default());

    let completion = moxie.translate_page(&dom);
    assert_eq!(completion.report().unwrap().failed, 1);
    assert_eq!(text_content(&dom.body().unwrap()), "Click here for more!");
}

#[test]
fn test_transport_failure_restores_visibility() {
    let dom = HtmlTestHelper::parse("<html><head></head><body><p>Hello there</p></body></html>");
    let transport = ScriptedTransport::new();
    transport.push_response(Err(helpers::transport_error(503, "service unavailable")));
    let config = MoxieConfig {
        hide_during_translation: true,
        ..MoxieConfig::default()
    };
    let mut moxie = moxie_with(&transport, config, RuleSet::default());

    let completion = moxie.translate_page(&dom);
    assert!(matches!(completion, Completion::Failed(_)));

    let body = dom.body().unwrap();
    assert!(!has_class(&body, constants::HIDE_CLASS));
    let head = dom.head().unwrap();
    let hide_style_left = head
        .children
        .borrow()
        .iter()
        .any(|c| get_node_attr(c, "id").as_deref() == Some(constants::HIDE_STYLE_ELEMENT_ID));
    assert!(!hide_style_left);
    assert_eq!(text_content(&body), "Hello there");
}

#[test]
fn test_ami_follow_up_posted() {
    let dom = HtmlTestHelper::parse("<html><body><p>Hello there</p></body></html>");
    let transport = ScriptedTransport::new();
    transport.push_response(Ok(TranslateResponse {
        text: vec![ResponseBlock {
            target: vec![JliffItem::text("Bonjour")],
        }],
        ami: vec![block_hash("Hello there")],
    }));
    let mut moxie = moxie_with(&transport, MoxieConfig::default(), RuleSet::default());
    moxie.translate_page(&dom);

    let ami = transport.ami.borrow();
    assert_eq!(ami.len(), 1);
    assert_eq!(ami[0].text[0].source, vec![JliffItem::text("Hello there")]);
}

#[test]
fn test_second_invocation_is_refused() {
    let dom = HtmlTestHelper::parse("<html><head></head><body><p>Hello there</p></body></html>");
    let transport = ScriptedTransport::new();
    let mut moxie = moxie_with(&transport, MoxieConfig::default(), RuleSet::default());

    assert!(moxie.translate_page(&dom).is_success());
    assert_eq!(moxie.translate_page(&dom), Completion::AlreadyTranslated);
    assert_eq!(transport.request_count(), 1);
}
