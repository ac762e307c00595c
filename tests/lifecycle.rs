//! Lifecycle classification tests
//!
//! Drives whole logs through the analyzer and checks which bucket each
//! object lands in.

mod common;
use common::{analyze, line};

use refscan::{
    analyze_str, AnalyzerConfig, ExitStatus, Outcome, PointerStatus, ReportFilter,
};

#[test]
fn constructor_then_destructor_is_finalized_only() {
    let analysis = analyze(&[
        line("0x1000", 1, "**constructor**40**20**", "(nil)", "create"),
        line("0x1000", -1, "destructor", "(nil)", "destroy"),
    ]);

    let buckets = &analysis.buckets;
    assert_eq!(buckets.finalized.len(), 1);
    for outcome in [
        Outcome::Invalid,
        Outcome::Leaked,
        Outcome::IndirectlyLeaked,
        Outcome::Skewed,
    ] {
        assert!(buckets.get(outcome).is_empty(), "{outcome:?} should be empty");
    }
}

#[test]
fn bare_integer_first_state_is_skewed() {
    let analysis = analyze(&[line("0x2000", 1, "5", "(nil)", "mid-life")]);

    assert_eq!(analysis.buckets.skewed.len(), 1);
    let object = &analysis.buckets.skewed[0];
    assert_eq!(object.starting_count(), 5);
    assert_eq!(object.running_count(), 6);
    assert!(analysis.buckets.leaked.is_empty());
}

#[test]
fn destructor_first_is_skewed_and_finalized_immediately() {
    let analysis = analyze(&[line("0x2000", -1, "destructor", "(nil)", "late")]);

    assert_eq!(analysis.buckets.skewed.len(), 1);
    assert_eq!(analysis.buckets.skewed[0].running_count(), 0);
    assert!(analysis.buckets.leaked.is_empty());
}

#[test]
fn over_release_is_invalid() {
    let analysis = analyze(&[
        line("0x1000", 1, "**constructor**0**8**", "(nil)", "create"),
        line("0x1000", -2, "1", "(nil)", "double unref"),
    ]);

    assert_eq!(analysis.buckets.invalid.len(), 1);
    assert!(analysis.buckets.finalized.is_empty());
}

#[test]
fn invalid_outranks_skewed() {
    let analysis = analyze(&[line("0x1000", -1, "0", "(nil)", "underflow")]);

    assert_eq!(analysis.buckets.invalid.len(), 1);
    assert!(analysis.buckets.skewed.is_empty());
}

#[test]
fn use_after_free_first_event_is_invalid() {
    let analysis = analyze(&[line("0x1000", 1, "**invalid**", "(nil)", "late ref")]);

    assert_eq!(analysis.buckets.invalid.len(), 1);
    assert_eq!(analysis.buckets.invalid[0].starting_count(), 0);
    assert_eq!(analysis.buckets.invalid[0].running_count(), 0);
    assert!(analysis.buckets.leaked.is_empty());
}

#[test]
fn allocation_after_invalid_reference_is_tracked_separately() {
    let analysis = analyze(&[
        line("0x1000", 1, "**invalid**", "(nil)", "late ref"),
        line("0x1000", 1, "**constructor**0**8**", "(nil)", "new object"),
    ]);

    assert_eq!(analysis.stats.objects, 2);
    assert_eq!(analysis.buckets.invalid.len(), 1);
    assert_eq!(analysis.buckets.invalid[0].history().count(), 1);
    assert_eq!(analysis.buckets.leaked.len(), 1, "new allocation should leak");
    let leaked = &analysis.buckets.leaked[0];
    assert_eq!(leaked.running_count(), 1);
    assert_eq!(leaked.declared_size(), Some(8));
}

#[test]
fn legacy_tag_starting_with_address_stays_in_tag() {
    let log = "\
0x1000,+1,1,chan.c,10,alloc,**constructor**0**8**,create
0x1000,+1,1,chan.c,11,ref,1,plain ref
0x1000,-1,1,chan.c,12,unref,2,0x2000,channel released
";
    let analysis = analyze_str(log, AnalyzerConfig::new());

    let object = &analysis.buckets.leaked[0];
    let last = object.history().last().unwrap();
    assert_eq!(last.event.tag, "0x2000,channel released");
    assert_eq!(last.event.pointer, None);
    assert_eq!(last.pointer_status, PointerStatus::Untracked);
}

#[test]
fn paired_pointer_reference_is_elided() {
    let analysis = analyze(&[
        line("0x1000", 1, "**constructor**0**8**", "(nil)", "create"),
        line("0x1000", 1, "1", "0x5000", "hold"),
        line("0x1000", -1, "2", "0x5000", "release"),
    ]);

    let object = &analysis.buckets.leaked[0];
    let tags: Vec<_> = object.history().map(|e| e.event.tag.as_str()).collect();
    assert_eq!(tags, ["create"]);
    assert_eq!(object.running_count(), 1);
}

#[test]
fn unmatched_pointer_release_is_retained_and_flagged() {
    let analysis = analyze(&[
        line("0x1000", 1, "**constructor**0**8**", "(nil)", "create"),
        line("0x1000", 1, "1", "(nil)", "plain"),
        line("0x1000", -1, "2", "0x5000", "stray"),
    ]);

    let object = &analysis.buckets.leaked[0];
    let last = object.history().last().unwrap();
    assert_eq!(last.event.tag, "stray");
    assert_eq!(last.pointer_status, PointerStatus::BadPointer);
}

#[test]
fn release_through_different_slot_does_not_pair() {
    let analysis = analyze(&[
        line("0x1000", 1, "**constructor**0**8**", "(nil)", "create"),
        line("0x1000", 1, "1", "0x5000", "hold"),
        line("0x1000", -1, "2", "0x6000", "other slot"),
    ]);

    let object = &analysis.buckets.leaked[0];
    assert_eq!(object.history().count(), 3);
    assert_eq!(object.open_pointer_refs(), 1);
}

#[test]
fn reference_held_inside_other_object_is_indirect_leak() {
    let analysis = analyze(&[
        line("0x3000", 1, "**constructor**0**64**", "(nil)", "a"),
        line("0x4000", 1, "**constructor**16**48**", "(nil)", "b"),
        line("0x3000", 1, "1", "0x4010", "b->a"),
        line("0x3000", -1, "2", "(nil)", "drop creator ref"),
    ]);

    let buckets = &analysis.buckets;
    assert_eq!(buckets.indirectly_leaked.len(), 1);
    let a = &buckets.indirectly_leaked[0];
    assert_eq!(a.address().as_str(), "0x3000");
    assert_eq!(a.running_count(), 1);
    assert_eq!(a.direct_count(), 0);

    let held = a.history().find(|e| e.event.tag == "b->a").unwrap();
    let containment = held.indirect.as_ref().unwrap();
    assert_eq!(containment.container.as_str(), "0x4000");
    assert_eq!(containment.offset, 0x10);

    assert_eq!(buckets.leaked.len(), 1);
    assert_eq!(buckets.leaked[0].address().as_str(), "0x4000");
}

#[test]
fn finalized_objects_are_not_offset_resolved() {
    let analysis = analyze(&[
        line("0x4000", 1, "**constructor**0**64**", "(nil)", "container"),
        line("0x3000", 1, "**constructor**0**8**", "(nil)", "a"),
        line("0x3000", 1, "1", "0x4010", "b->a"),
        line("0x3000", -1, "2", "(nil)", "unref"),
        line("0x3000", -1, "1", "(nil)", "destroy"),
    ]);

    let a = &analysis.buckets.finalized[0];
    assert!(a.history().all(|e| e.indirect.is_none()));
}

#[test]
fn short_line_does_not_disturb_other_objects() {
    let log = [
        line("0x1000", 1, "**constructor**40**20**", "(nil)", "create"),
        "0x2000,1,1,chan.c,10".to_string(),
        line("0x1000", -1, "destructor", "(nil)", "destroy"),
    ]
    .join("\n");

    let analysis = analyze_str(&log, AnalyzerConfig::new());
    assert_eq!(analysis.stats.malformed, 1);
    assert_eq!(analysis.stats.objects, 1);
    assert_eq!(analysis.buckets.finalized.len(), 1);
}

#[test]
fn end_to_end_finalized_scenario() {
    let log = "0x1000,1,1,chan.c,10,alloc,**constructor**40**20**,(nil),create\n\
               0x1000,-1,1,chan.c,20,free,destructor,(nil),destroy\n";
    let analysis = analyze_str(log, AnalyzerConfig::new());

    let object = &analysis.buckets.finalized[0];
    assert_eq!(object.declared_size(), Some(60));
    assert_eq!(object.history().count(), 2);
    let status = ExitStatus::from_buckets(&analysis.buckets, &ReportFilter::all());
    assert_eq!(status.code(), 0);
}

#[test]
fn end_to_end_leak_scenario() {
    let log = "0x1000,1,1,chan.c,10,alloc,**constructor**40**20**,(nil),create\n";
    let analysis = analyze_str(log, AnalyzerConfig::new());

    assert_eq!(analysis.buckets.leaked.len(), 1);
    assert_eq!(analysis.buckets.leaked[0].direct_count(), 1);
    let status = ExitStatus::from_buckets(&analysis.buckets, &ReportFilter::all());
    assert!(status.contains(ExitStatus::LEAKS));
}

#[test]
fn exit_bits_track_enabled_buckets() {
    let analysis = analyze(&[
        line("0x1000", 1, "**constructor**0**8**", "(nil)", "leak"),
        line("0x2000", 1, "3", "(nil)", "skew"),
        line("0x3000", -1, "0", "(nil)", "invalid"),
    ]);
    let all = ReportFilter::all();

    let status = ExitStatus::from_buckets(&analysis.buckets, &all);
    assert_eq!(status.bits(), 0b111);

    let status = ExitStatus::from_buckets(&analysis.buckets, &all.with_skewed(false));
    assert_eq!(status.bits(), ExitStatus::LEAKS | ExitStatus::INVALID);

    let status = ExitStatus::from_buckets(
        &analysis.buckets,
        &all.with_leaked(false).with_invalid(false),
    );
    assert_eq!(status.bits(), ExitStatus::SKEWED);
}

#[test]
fn indirect_bucket_alone_sets_leak_bit() {
    let analysis = analyze(&[
        line("0x3000", 1, "**constructor**0**64**", "(nil)", "a"),
        line("0x4000", 1, "**constructor**0**64**", "(nil)", "b"),
        line("0x3000", 1, "1", "0x4010", "b->a"),
        line("0x3000", -1, "2", "(nil)", "drop"),
    ]);

    let filter = ReportFilter::all().with_leaked(false);
    let status = ExitStatus::from_buckets(&analysis.buckets, &filter);
    assert!(status.contains(ExitStatus::LEAKS));

    let status = ExitStatus::from_buckets(&analysis.buckets, &filter.with_indirect(false));
    assert!(status.is_clean());
}
