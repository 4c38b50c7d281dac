use axm_context::format_context;
use axm_types::{ContentFormat, ContextAttachment, Priority};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

#[test]
fn test_priority_order_and_escaping() {
    let attachments = vec![
        ContextAttachment::note("a").with_priority(Priority::Low),
        ContextAttachment::note("b")
            .with_priority(Priority::High)
            .with_label("A <b> \"c\""),
    ];

    let out = format_context("Do X.", &attachments);

    assert_eq!(
        out,
        "Do X.\n\n\
         <context type=\"note\" priority=\"high\" label=\"A &lt;b&gt; &quot;c&quot;\">\nb\n</context>\n\n\
         <context type=\"note\" priority=\"low\">\na\n</context>"
    );
}

#[test]
fn test_ties_keep_input_order() {
    let attachments = vec![
        ContextAttachment::note("first"),
        ContextAttachment::note("second").with_priority(Priority::Medium),
        ContextAttachment::note("third"),
    ];

    let out = format_context("", &attachments);

    assert_eq!(
        out,
        "\n\n<context type=\"note\" priority=\"medium\">\nsecond\n</context>\n\n\
         <context type=\"note\">\nfirst\n</context>\n\n\
         <context type=\"note\">\nthird\n</context>"
    );
}

#[test]
fn test_mixed_formats() {
    let attachments = vec![
        ContextAttachment::file("config.json")
            .with_format(ContentFormat::Json)
            .with_content(r#"{"port":8080}"#),
        ContextAttachment::note("boot | ready").with_format(ContentFormat::Log),
        ContextAttachment::note("# Title").with_format(ContentFormat::Markdown),
    ];

    let out = format_context("Check.", &attachments);

    assert_eq!(
        out,
        "Check.\n\n\
         <context type=\"file\" format=\"json\" path=\"config.json\">\n{\n  \"port\": 8080\n}\n</context>\n\n\
         <context type=\"note\" format=\"log\">\nboot\nready\n</context>\n\n\
         <context type=\"note\" format=\"markdown\">\n# Title\n</context>"
    );
}

fn any_priority() -> impl Strategy<Value = Priority> {
    prop::sample::select(vec![
        Priority::High,
        Priority::Medium,
        Priority::Low,
        Priority::Unset,
    ])
}

fn any_attachment() -> impl Strategy<Value = ContextAttachment> {
    (any_priority(), "[a-z<>&\" ]{0,12}", "[a-z]{0,6}").prop_map(|(priority, content, label)| {
        ContextAttachment::note(content)
            .with_priority(priority)
            .with_label(label)
    })
}

proptest! {
    #[test]
    fn prop_deterministic(base in ".{0,32}", attachments in prop::collection::vec(any_attachment(), 0..6)) {
        prop_assert_eq!(format_context(&base, &attachments), format_context(&base, &attachments));
    }

    #[test]
    fn prop_no_attachments_is_identity(base in ".{0,64}") {
        prop_assert_eq!(format_context(&base, &[]), base);
    }

    #[test]
    fn prop_blocks_follow_priority(attachments in prop::collection::vec(any_attachment(), 1..6)) {
        // Tag each attachment with its index so blocks can be traced back.
        let tagged: Vec<ContextAttachment> = attachments
            .into_iter()
            .enumerate()
            .map(|(i, a)| a.with_key(format!("k{i}")))
            .collect();

        let out = format_context("base", &tagged);

        let mut expected: Vec<&ContextAttachment> = tagged.iter().collect();
        expected.sort_by_key(|a| a.priority.rank());
        let positions: Vec<usize> = expected
            .iter()
            .map(|a| out.find(&format!("key=\"{}\"", a.key)).unwrap())
            .collect();
        prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }
}
