//! Integration tests for the modulith-filter crate.
//!
//! These tests drive the parser, evaluator, and indexability analysis
//! together over realistic service property sets.

use modulith_filter::{Filter, FilterError, Properties, SimpleCache, Value};

fn service_props() -> Properties {
    [
        (
            "objectclass",
            Value::List(vec![
                Value::Str("com.example.HttpServer".to_owned()),
                Value::Str("com.example.Server".to_owned()),
            ]),
        ),
        ("service.id", Value::Int(42)),
        ("service.ranking", Value::Int(5)),
        ("vendor", Value::Str("Acme Widgets".to_owned())),
        ("port", Value::Int(8080)),
        ("load", Value::Float(0.75)),
        ("secure", Value::Bool(true)),
    ]
    .into_iter()
    .collect()
}

// ═══════════════════════════════════════════════════════════════════════
//  Parsing and the round-trip law
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn every_valid_filter_round_trips_through_display() {
    let inputs = [
        "(a=1)",
        "(a=*)",
        "(a=pre*mid*post)",
        "(a~=fuzzy)",
        "(a>=10)",
        "(a<=10)",
        "(!(a=1))",
        "(&(a=1)(b=2)(c=3))",
        "(|(objectclass=IFoo)(objectclass=IBar))",
        "(&(|(a=1)(b=2))(!(c=par\\(en\\))))",
        "(path=C:\\5c*)",
        "  ( & ( a = 1 ) ( b = two words ) )  ",
    ];
    for input in inputs {
        let parsed = Filter::parse(input).expect("input should parse");
        let printed = parsed.to_string();
        let reparsed = Filter::parse(&printed).expect("printed form should re-parse");
        assert_eq!(parsed, reparsed, "round-trip failed for {input:?}");
    }
}

#[test]
fn error_taxonomy_is_distinguishable() {
    assert!(matches!(Filter::parse(""), Err(FilterError::Empty)));
    assert!(matches!(Filter::parse("   "), Err(FilterError::Empty)));
    assert!(matches!(
        Filter::parse("(a=1)garbage"),
        Err(FilterError::TrailingCharacters { .. })
    ));
    assert!(matches!(
        Filter::parse("(a=1"),
        Err(FilterError::UnexpectedEnd)
    ));
    assert!(matches!(
        Filter::parse("(=1)"),
        Err(FilterError::Syntax { .. })
    ));
    assert!(matches!(
        Filter::parse("(a>1)"),
        Err(FilterError::Syntax { .. })
    ));
}

// ═══════════════════════════════════════════════════════════════════════
//  Evaluation
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn realistic_queries_match_a_service_record() {
    let props = service_props();
    let matching = [
        "(objectclass=com.example.Server)",
        "(objectclass=COM.EXAMPLE.SERVER)",
        "(&(vendor=Acme*)(port>=1024))",
        "(|(port=80)(port=8080))",
        "(vendor~=acmewidgets)",
        "(load<=0.8)",
        "(secure=true)",
        "(!(port=80))",
        "(service.id=42)",
    ];
    for query in matching {
        let filter = Filter::parse(query).expect("query should parse");
        assert!(filter.evaluate(&props, false), "expected match: {query}");
    }

    let non_matching = [
        "(objectclass=com.example.Database)",
        "(&(vendor=Acme*)(port<=1023))",
        "(port=eight)",
        "(secure=false)",
        "(missing=*)",
    ];
    for query in non_matching {
        let filter = Filter::parse(query).expect("query should parse");
        assert!(!filter.evaluate(&props, false), "unexpected match: {query}");
    }
}

#[test]
fn match_case_controls_attribute_lookup() {
    let props: Properties = [("Vendor", "acme")].into_iter().collect();
    let filter = Filter::parse("(vendor=acme)").expect("query should parse");
    assert!(filter.evaluate(&props, false));
    assert!(!filter.evaluate(&props, true));
}

#[test]
fn wildcard_segments_must_not_overlap() {
    let props: Properties = [("name", "a")].into_iter().collect();
    let filter = Filter::parse("(name=a*a)").expect("query should parse");
    assert!(!filter.evaluate(&props, false));

    let props: Properties = [("name", "aba")].into_iter().collect();
    assert!(filter.evaluate(&props, false));
}

// ═══════════════════════════════════════════════════════════════════════
//  Indexability analysis
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn is_simple_collects_literals_per_keyword() {
    let keywords = ["objectclass", "service.id"];
    let mut cache = SimpleCache::new();

    let filter = Filter::parse("(|(objectclass=IFoo)(service.id=7)(objectclass=IBar))")
        .expect("query should parse");
    assert!(filter.is_simple(&keywords, &mut cache, false));
    assert_eq!(cache[0], vec!["IFoo".to_owned(), "IBar".to_owned()]);
    assert_eq!(cache[1], vec!["7".to_owned()]);
}

#[test]
fn only_lone_eq_or_or_of_eqs_is_simple() {
    let keywords = ["objectclass", "service.id"];
    let mut cache = SimpleCache::new();

    let simple = ["(objectclass=IFoo)", "(|(objectclass=IFoo)(objectclass=IBar))"];
    for query in simple {
        let filter = Filter::parse(query).expect("query should parse");
        assert!(
            filter.is_simple(&keywords, &mut cache, false),
            "expected simple: {query}"
        );
    }

    let complex = [
        // AND never qualifies, even over indexable legs.
        "(&(objectclass=IFoo)(objectclass=IBar))",
        "(!(objectclass=IFoo))",
        "(objectclass=IFoo*)",
        "(objectclass>=IFoo)",
        "(objectclass~=IFoo)",
        "(vendor=acme)",
        "(|(objectclass=IFoo)(vendor=acme))",
    ];
    for query in complex {
        let filter = Filter::parse(query).expect("query should parse");
        assert!(
            !filter.is_simple(&keywords, &mut cache, false),
            "expected complex: {query}"
        );
    }
}
