use tempfile::NamedTempFile;

use runic_buffer::Span;
use runic_core::address::Address;
use runic_core::edit::{Append, Change, Delete, SetMark, Substitute};
use runic_core::{default_matcher_factory, Buffer};

fn fresh_buffer() -> std::sync::Arc<Buffer> {
    let tmp = NamedTempFile::new().unwrap();
    let path = tmp.path().to_path_buf();
    drop(tmp);
    Buffer::create(path)
}

fn text_of(buffer: &Buffer) -> String {
    buffer.read(0, buffer.size()).unwrap().into_iter().collect()
}

fn noop_print(_: &[char]) {}

#[test]
fn scenario_1_append_to_empty_buffer() {
    let buffer = fresh_buffer();
    let editor = buffer.attach_editor();

    let edit = Append { addr: Address::End, text: "Hello, World!".chars().collect() };
    let dot = editor.do_edit(&edit, &default_matcher_factory, &mut noop_print).unwrap();

    assert_eq!(text_of(&buffer), "Hello, World!");
    assert_eq!(dot, Span::new(0, 13));
}

#[test]
fn scenario_2_regexp_change() {
    let buffer = fresh_buffer();
    let editor = buffer.attach_editor();
    editor
        .do_edit(
            &Append { addr: Address::End, text: "Hello, World!".chars().collect() },
            &default_matcher_factory,
            &mut noop_print,
        )
        .unwrap();

    let edit = Change { addr: Address::regexp("World"), text: "世界".chars().collect() };
    let dot = editor.do_edit(&edit, &default_matcher_factory, &mut noop_print).unwrap();

    assert_eq!(text_of(&buffer), "Hello, 世界!");
    assert_eq!(dot, Span::new(7, 9));
}

#[test]
fn scenario_3_substitute_with_backreferences() {
    let buffer = fresh_buffer();
    let editor = buffer.attach_editor();
    editor
        .do_edit(
            &Append { addr: Address::End, text: "abcdefghi".chars().collect() },
            &default_matcher_factory,
            &mut noop_print,
        )
        .unwrap();

    let edit = Substitute {
        addr: Address::Line(0).comma(Address::End),
        pattern: "(abc)(def)(ghi)".to_string(),
        with: "\\0 \\3 \\2 \\1".to_string(),
        global: false,
        from: 1,
    };
    editor.do_edit(&edit, &default_matcher_factory, &mut noop_print).unwrap();

    assert_eq!(text_of(&buffer), "abcdefghi ghi def abc");
}

#[test]
fn scenario_4_two_editors_prepend_and_append() {
    let buffer = fresh_buffer();
    let editor0 = buffer.attach_editor();
    let editor1 = buffer.attach_editor();

    // "0c/.../" is shorthand for "replace the empty point at the start of
    // the buffer" — modeled directly with Rune(0) to sidestep Line(0)'s
    // open-question ambiguity (see DESIGN.md).
    let dot0 = editor0
        .do_edit(
            &Change { addr: Address::Rune(0), text: "世界!".chars().collect() },
            &default_matcher_factory,
            &mut noop_print,
        )
        .unwrap();
    let dot1 = editor1
        .do_edit(
            &Change { addr: Address::Rune(0), text: "Hello, ".chars().collect() },
            &default_matcher_factory,
            &mut noop_print,
        )
        .unwrap();

    assert_eq!(text_of(&buffer), "Hello, 世界!");
    assert_eq!(dot1, Span::new(0, 7));
    // editor0's dot, recorded before editor1's insertion shifted it,
    // tracks the same inserted runes via the span algebra afterward.
    assert_eq!(dot0, Span::new(0, 3));
    assert_eq!(editor0.dot(), Span::new(7, 10));
}

#[test]
fn scenario_5_mark_collapses_under_full_overwrite() {
    let buffer = fresh_buffer();
    let editor = buffer.attach_editor();
    editor
        .do_edit(
            &Append { addr: Address::Dot, text: "Hello, World!".chars().collect() },
            &default_matcher_factory,
            &mut noop_print,
        )
        .unwrap();
    editor
        .do_edit(
            &SetMark { addr: Address::regexp("World"), mark: 'a' },
            &default_matcher_factory,
            &mut noop_print,
        )
        .unwrap();
    editor
        .do_edit(
            &Change { addr: Address::Line(0).comma(Address::End), text: "abc".chars().collect() },
            &default_matcher_factory,
            &mut noop_print,
        )
        .unwrap();

    assert_eq!(text_of(&buffer), "abc");
    let mark_a = editor.mark('a').unwrap();
    assert!(mark_a.is_point());
    assert_eq!(mark_a, Span::point(3));
}

#[test]
fn scenario_6_undo_then_redo_restores_state() {
    let buffer = fresh_buffer();
    let editor = buffer.attach_editor();
    editor
        .do_edit(
            &Append { addr: Address::End, text: "Hello, World!".chars().collect() },
            &default_matcher_factory,
            &mut noop_print,
        )
        .unwrap();

    let text_before = text_of(&buffer);
    let dot_before = editor.dot();

    editor
        .do_edit(
            &Change { addr: Address::regexp("World"), text: "世界".chars().collect() },
            &default_matcher_factory,
            &mut noop_print,
        )
        .unwrap();
    let text_after = text_of(&buffer);
    let dot_after = editor.dot();
    assert_ne!(text_after, text_before);

    editor.undo(1).unwrap();
    assert_eq!(text_of(&buffer), text_before);
    assert_eq!(editor.dot(), dot_before);

    editor.redo(1).unwrap();
    assert_eq!(text_of(&buffer), text_after);
    assert_eq!(editor.dot(), dot_after);
}

#[test]
fn two_phase_atomicity_on_failed_record() {
    let buffer = fresh_buffer();
    let editor = buffer.attach_editor();
    editor
        .do_edit(
            &Append { addr: Address::End, text: "abc".chars().collect() },
            &default_matcher_factory,
            &mut noop_print,
        )
        .unwrap();

    let marks_before = editor.dot();
    let text_before = text_of(&buffer);

    let edit = Delete { addr: Address::regexp("zzz") };
    let result = editor.do_edit(&edit, &default_matcher_factory, &mut noop_print);
    assert!(result.is_err());

    assert_eq!(editor.dot(), marks_before);
    assert_eq!(text_of(&buffer), text_before);
}

#[test]
fn out_of_sequence_detection() {
    let buffer = fresh_buffer();
    let editor = buffer.attach_editor();
    editor
        .do_edit(
            &Append { addr: Address::End, text: "0123456789abcdefghij".chars().collect() },
            &default_matcher_factory,
            &mut noop_print,
        )
        .unwrap();

    struct OutOfOrderEdit;
    impl std::fmt::Debug for OutOfOrderEdit {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "OutOfOrderEdit")
        }
    }
    impl runic_core::edit::Edit for OutOfOrderEdit {
        fn to_source_string(&self) -> String {
            "out-of-order".to_string()
        }
        fn record(
            &self,
            ctx: &mut dyn runic_core::EditContext,
            _matcher_for: &runic_core::MatcherFactory,
        ) -> Result<Span, runic_core::EditError> {
            ctx.pend(Span::new(10, 20), Vec::new());
            ctx.pend(Span::new(0, 10), Vec::new());
            Ok(Span::point(0))
        }
    }

    let text_before = text_of(&buffer);
    let marks_before = editor.dot();
    let result = editor.do_edit(&OutOfOrderEdit, &default_matcher_factory, &mut noop_print);
    assert!(matches!(result, Err(runic_core::EditError::OutOfSequence)));
    assert_eq!(text_of(&buffer), text_before);
    assert_eq!(editor.dot(), marks_before);
}
