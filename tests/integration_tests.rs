//! End-to-end tests driving the public API the way a host application
//! would: whole documents in, resolved values and diagnostics out.

use scoreprep::{resolve, Numb, Session, Value};

#[test]
fn test_full_document_resolves() {
    let src = "
        // a small score
        title = 'Trio in C'
        author = 'A. Composer'
        beat = 1/8
        timesig = (6, 8)
        keysig = (f#, c#)
        inst <id: violin, name: Violin, abbr: Vln,
              staff <clef (name treble)>>
        export (file: 'trio.ly', module: lyout)
    ";
    let session = resolve("trio.fms", src).unwrap();
    assert!(session.diagnostics.is_empty());
    assert_eq!(
        session.value("beat"),
        Some(Value::Num(Numb::rational(1, 8).unwrap()))
    );
    assert_eq!(
        session.value("timesig"),
        Some(Value::ListNum(vec![Numb::Int(6), Numb::Int(8)]))
    );
    assert_eq!(session.instruments.len(), 1);
    assert_eq!(session.exports.len(), 1);
}

#[test]
fn test_append_vs_replace() {
    let session = resolve(
        "score.fms",
        "dyn-levels = (1, 3), dyn-levels += 5, dyn-levels += (7, 9)",
    )
    .unwrap();
    assert_eq!(
        session.value("dyn-levels"),
        Some(Value::ListNum(
            [1, 3, 5, 7, 9].iter().map(|&n| Numb::Int(n)).collect()
        ))
    );
    let session = resolve("score.fms", "dyn-levels = (1, 3), dyn-levels = (2, 4)").unwrap();
    assert_eq!(
        session.value("dyn-levels"),
        Some(Value::ListNum(vec![Numb::Int(2), Numb::Int(4)]))
    );
}

#[test]
fn test_failed_assignment_leaves_prior_value_in_force() {
    let mut session = Session::new();
    let report = session
        .parse_document(
            "score.fms",
            "beat = 1/8, beat = 3, nonsuch = 1, title = Kept",
        )
        .unwrap();
    assert_eq!(report.errors, 2);
    assert_eq!(
        session.value("beat"),
        Some(Value::Num(Numb::rational(1, 8).unwrap()))
    );
    assert_eq!(session.value("title"), Some(Value::Str("Kept".to_string())));
}

#[test]
fn test_location_rejection_is_recoverable() {
    let mut session = Session::new();
    let report = session
        .parse_document("score.fms", "notehead = x, beat = 1/2")
        .unwrap();
    assert_eq!(report.errors, 1);
    let formatted = session.formatted_diagnostics();
    assert!(formatted[0].contains("not allowed inside score"));
    assert_eq!(
        session.value("beat"),
        Some(Value::Num(Numb::rational(1, 2).unwrap()))
    );
}

#[test]
fn test_keysig_round_trips_semantically() {
    let session = resolve("score.fms", "keysig = (bb, eb, ab)").unwrap();
    let entries = session.ctx.keysig.to_entries(&session.ctx);
    let rebuilt = scoreprep::symbols::KeySigTable::build(&entries, &session.ctx).unwrap();
    assert_eq!(rebuilt, session.ctx.keysig);
}

#[test]
fn test_nearest_pitch_spans_a_document() {
    // successive bare pitch classes climb stepwise from middle c
    let src = "percinst (id: a, note: c), percinst (id: b, note: d), \
               percinst (id: e1, note: e)";
    let session = resolve("score.fms", src).unwrap();
    assert!(session.diagnostics.is_empty());
    assert_eq!(session.percinsts.get("a").unwrap().note, Some(Numb::Int(60)));
    assert_eq!(session.percinsts.get("b").unwrap().note, Some(Numb::Int(62)));
    assert_eq!(session.percinsts.get("e1").unwrap().note, Some(Numb::Int(64)));
}

#[test]
fn test_activation_changes_later_parsing() {
    let src = "note-symbols = (do: 0, re: 2, mi: 4, fa: 5, sol: 7, la: 9, ti: 11), \
               percinst (id: x, note: mi)";
    let session = resolve("score.fms", src).unwrap();
    assert!(session.diagnostics.is_empty());
    assert_eq!(session.percinsts.get("x").unwrap().note, Some(Numb::Int(64)));
}

#[test]
fn test_nested_comments_through_the_pipeline() {
    let src = "/- outer /- inner -/ still skipped -/ beat = 1/2 // trailing";
    let session = resolve("score.fms", src).unwrap();
    assert!(session.diagnostics.is_empty());
    assert_eq!(
        session.value("beat"),
        Some(Value::Num(Numb::rational(1, 2).unwrap()))
    );
}

#[test]
fn test_value_serializes_back_to_source() {
    let session = resolve("score.fms", "timesig = (3, 4)").unwrap();
    let v = session.value("timesig").unwrap();
    assert_eq!(v.to_source(), "(3, 4)");
}

#[test]
fn test_yaml_output_contains_resolved_state() {
    let session = resolve(
        "score.fms",
        "title = Output, inst <id: fl, name: Flute>",
    )
    .unwrap();
    let yaml = serde_yaml::to_string(&session.output()).unwrap();
    assert!(yaml.contains("title: Output"));
    assert!(yaml.contains("fl"));
    assert!(yaml.contains("Flute"));
}

#[test]
fn test_template_inheritance_end_to_end() {
    let src = "inst <id: violin, name: Violin, abbr: Vln, min-pitch: 55>\n\
               inst <id: viola, template: violin, name: Viola, min-pitch: 48>";
    let session = resolve("score.fms", src).unwrap();
    let viola = session.instruments.get("viola").unwrap();
    assert_eq!(viola.abbr, "Vln");
    assert_eq!(viola.min_pitch, Some(Numb::Int(48)));
    assert_eq!(
        session.instruments.get("violin").unwrap().min_pitch,
        Some(Numb::Int(55))
    );
}
