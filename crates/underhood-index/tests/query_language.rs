use underhood_index::query::{self, Pattern, Q, QueryError};

fn content(q: &Q) -> &Pattern {
    match q {
        Q::Content(pattern) => pattern,
        other => panic!("expected content atom, got {other}"),
    }
}

#[test]
fn escaped_metacharacters_parse_as_literal_text() {
    let q = query::parse(r"a\.b\(c\)").expect("query should parse");
    let pattern = content(&q);
    assert_eq!(pattern.literal.as_deref(), Some("a.b(c)"));
    assert!(!pattern.case_sensitive);

    let re = regex::Regex::new(&pattern.regex).expect("valid regex");
    assert!(re.is_match("x = a.b(c);"));
    assert!(!re.is_match("aXbc"));
}

#[test]
fn escaped_space_keeps_a_single_phrase() {
    let q = query::parse(r"hello\ world").expect("query should parse");
    assert_eq!(content(&q).literal.as_deref(), Some("hello world"));
}

#[test]
fn unescaped_metacharacters_build_a_regex() {
    let q = query::parse(r"\bfoo.*bar\b").expect("query should parse");
    let pattern = content(&q);
    assert_eq!(pattern.literal, None);
    assert_eq!(pattern.regex, r"\bfoo.*bar\b");
}

#[test]
fn repository_and_file_atoms() {
    let q = query::parse("r:zoekt f:^src/.*$").expect("query should parse");
    let Q::And(children) = q else {
        panic!("expected conjunction");
    };
    assert_eq!(children[0], Q::Repo("zoekt".to_string()));
    let Q::File(file) = &children[1] else {
        panic!("expected file atom");
    };
    assert_eq!(file.regex, "^src/.*$");
}

#[test]
fn empty_repository_atom_is_allowed() {
    assert_eq!(query::parse("r:"), Ok(Q::Repo(String::new())));
}

#[test]
fn unknown_field_is_rejected() {
    assert_eq!(
        query::parse("foo:bar"),
        Err(QueryError::UnknownField("foo".to_string()))
    );
}

#[test]
fn case_setting_applies_to_every_pattern() {
    let auto_upper = query::parse("Foo").expect("query should parse");
    assert!(content(&auto_upper).case_sensitive);

    let auto_lower = query::parse("foo").expect("query should parse");
    assert!(!content(&auto_lower).case_sensitive);

    let forced = query::parse("Foo case:no").expect("query should parse");
    assert!(!content(&forced).case_sensitive);

    let Q::And(children) = query::parse("case:yes a f:b").expect("query should parse") else {
        panic!("expected conjunction");
    };
    assert!(content(&children[0]).case_sensitive);
    assert!(matches!(&children[1], Q::File(p) if p.case_sensitive));

    assert_eq!(
        query::parse("foo case:maybe"),
        Err(QueryError::InvalidCase("maybe".to_string()))
    );
}

#[test]
fn alternation_negation_and_grouping() {
    let q = query::parse("a or b").expect("query should parse");
    assert!(matches!(q, Q::Or(ref alts) if alts.len() == 2));

    let q = query::parse("-f:test foo").expect("query should parse");
    let Q::And(children) = q else {
        panic!("expected conjunction");
    };
    assert!(matches!(&children[0], Q::Not(inner) if matches!(**inner, Q::File(_))));

    let q = query::parse("(a or b) c").expect("query should parse");
    let Q::And(children) = q else {
        panic!("expected conjunction");
    };
    assert!(matches!(children[0], Q::Or(_)));
}

#[test]
fn quoted_strings_are_literal() {
    let q = query::parse(r#""a (b) c""#).expect("query should parse");
    assert_eq!(content(&q).literal.as_deref(), Some("a (b) c"));
}

#[test]
fn malformed_queries() {
    assert_eq!(query::parse("   "), Err(QueryError::Empty));
    assert_eq!(query::parse("a or"), Err(QueryError::DanglingOr));
    assert_eq!(query::parse("(a"), Err(QueryError::UnbalancedParen(0)));
    assert_eq!(query::parse("a)"), Err(QueryError::UnbalancedParen(1)));
    assert_eq!(query::parse("\"abc"), Err(QueryError::UnterminatedQuote(0)));
    assert_eq!(query::parse("abc\\"), Err(QueryError::DanglingEscape));
    assert!(matches!(query::parse("a[b"), Err(QueryError::InvalidRegex(_))));
}

#[test]
fn repo_only_detection() {
    assert!(query::parse("r:foo").expect("parse").is_repo_only());
    assert!(query::parse("r:foo r:bar").expect("parse").is_repo_only());
    assert!(!query::parse("r:foo needle").expect("parse").is_repo_only());
}
