use std::path::PathBuf;

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use xml_mapper::{Attributes, Options, OutputKey, SpecDefinition, Specification, Value};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn album_spec() -> Specification {
    Specification::build(|m| {
        m.text(["title", "version_title"]);
        m.integer("released_in");
        m.text_with("country", Options::after_map("upcase"));
        m.text_with("released_on", Options::after_map("parse_date"));
        m.boolean("allows_streaming");

        m.within("artist", |m| {
            m.text(("name", "artist_name"));
            m.integer(("id", "artist_id"));
        });

        m.many(("contributions/*", "contributions"), |m| {
            m.node_name("role");
            m.inner_text("name");
        });

        m.many(("tracks/track", "tracks"), |m| {
            m.attribute(("code", "isrc"));
            m.text(("title", "track_title"));
            m.text("version_title");
            m.integer(("number", "track_number"));
            m.integer(("disk", "disk_number"));
            m.exists("explicit_lyrics");
            m.not_exists(("not_streamable_in/country[text()='de']", "allows_streaming"));
            m.text(("performer", OutputKey::path(["contributions", "performer"])));
            m.text(("producer", OutputKey::path(["contributions", "producer"])));
        });

        m.after_map(|atts| {
            let count = atts["tracks"].as_list().map_or(0, <[Value]>::len);
            atts.insert("tracks_count", count);
        });
    })
    .unwrap()
}

fn map<const N: usize>(pairs: [(&str, Value); N]) -> Value {
    Value::Map(Attributes::from_iter(pairs))
}

#[test]
fn test_album_fixture() {
    let path = fixture("base.xml");
    let attributes = album_spec().extract_path(&path).unwrap();

    let expected = [
        ("title", Value::from("Black on Both Sides")),
        ("version_title", Value::from("Extended Edition")),
        ("released_in", Value::Integer(1999)),
        ("artist_name", Value::from("Mos Def")),
        ("artist_id", Value::Integer(1212)),
        ("country", Value::from("DE")),
        ("allows_streaming", Value::Bool(true)),
        ("tracks_count", Value::Integer(2)),
        (
            "released_on",
            Value::Date(NaiveDate::from_ymd_opt(1999, 10, 12).unwrap()),
        ),
        (
            "contributions",
            Value::List(vec![
                map([("role", Value::from("artist")), ("name", Value::from("Mos Def"))]),
                map([("role", Value::from("producer")), ("name", Value::from("DJ Premier"))]),
            ]),
        ),
        ("xml_path", Value::from(&*path.to_string_lossy())),
    ];
    for (key, value) in expected {
        assert_eq!(attributes[key], value, "key {}", key);
    }
}

#[test]
fn test_album_fixture_tracks() {
    let attributes = album_spec().extract_path(fixture("base.xml")).unwrap();
    let tracks = attributes["tracks"].as_list().unwrap();
    assert_eq!(tracks.len(), 2);

    let expected = [
        [
            ("track_title", Value::from("Fear Not of Man")),
            ("track_number", Value::Integer(1)),
            ("disk_number", Value::Integer(1)),
            ("explicit_lyrics", Value::Bool(true)),
            ("isrc", Value::from("1234")),
            ("allows_streaming", Value::Bool(true)),
            ("version_title", Value::Nil),
        ],
        [
            ("track_title", Value::from("Hip Hop")),
            ("track_number", Value::Integer(2)),
            ("disk_number", Value::Integer(1)),
            ("explicit_lyrics", Value::Bool(false)),
            ("isrc", Value::from("2345")),
            ("allows_streaming", Value::Bool(false)),
            ("version_title", Value::from("Album Version")),
        ],
    ];
    for (track, expected) in tracks.iter().zip(expected) {
        let track = track.as_map().unwrap();
        for (key, value) in expected {
            assert_eq!(track[key], value, "key {}", key);
        }
        assert!(!track.contains_key("xml_path"));
    }

    let first = tracks[0].as_map().unwrap();
    assert_eq!(
        first["contributions"],
        map([
            ("performer", Value::from("Mos Def")),
            ("producer", Value::from("DJ Premier")),
        ])
    );
    let second = tracks[1].as_map().unwrap();
    assert_eq!(second.get_path(&["contributions", "producer"]), Some(&Value::Nil));
}

#[test]
fn test_end_to_end_scenario() {
    let spec = Specification::build(|m| {
        m.text("title");
        m.many(("tracks/track", "tracks"), |m| {
            m.integer(("n", "number"));
        });
    })
    .unwrap();
    let attributes = spec
        .extract_str("<album><title>T</title><tracks><track><n>1</n></track><track><n>2</n></track></tracks></album>")
        .unwrap();

    assert_eq!(
        attributes,
        Attributes::from_iter([
            ("title", Value::from("T")),
            (
                "tracks",
                Value::List(vec![
                    map([("number", Value::Integer(1))]),
                    map([("number", Value::Integer(2))]),
                ]),
            ),
        ])
    );
    assert_eq!(
        attributes.to_json(),
        serde_json::json!({"title": "T", "tracks": [{"number": 1}, {"number": 2}]})
    );
}

#[test]
fn test_inherited_specification_shallow_overwrite() {
    let parent = Specification::build(|m| {
        m.text(("artist/name", "artist_name"));
        m.text(("title", OutputKey::path(["meta", "title"])));
        m.text(("version_title", OutputKey::path(["meta", "version"])));
    })
    .unwrap();
    let child = Specification::build(|m| {
        m.inherit(parent);
        m.text_with(("title", OutputKey::path(["meta", "title"])), Options::after_map("upcase"));
    })
    .unwrap();

    let attributes = child.extract_path(fixture("base.xml")).unwrap();
    assert_eq!(attributes["artist_name"], Value::from("Mos Def"));
    // nested maps are replaced wholesale, not merged
    assert_eq!(
        attributes["meta"],
        map([("title", Value::from("BLACK ON BOTH SIDES"))])
    );
    assert!(attributes.contains_key("xml_path"));
}

#[test]
fn test_included_specification_later_entry_wins() {
    let shared = Specification::build(|m| {
        m.text(("title", "name"));
    })
    .unwrap();
    let spec = Specification::build(|m| {
        m.include(&shared);
        m.text(("version_title", "name"));
    })
    .unwrap();
    let attributes = spec.extract_path(fixture("base.xml")).unwrap();
    assert_eq!(attributes["name"], Value::from("Extended Edition"));
}

#[test]
fn test_post_processing_helpers() {
    let mut attributes = album_spec().extract_path(fixture("base.xml")).unwrap();
    attributes.clone_attributes_into(&["artist_name", "released_in"], &["tracks"]);
    attributes.strip_attributes();

    let tracks = attributes["tracks"].as_list().unwrap();
    for track in tracks {
        let track = track.as_map().unwrap();
        assert_eq!(track["artist_name"], Value::from("Mos Def"));
        assert_eq!(track["released_in"], Value::Integer(1999));
    }
}

#[test]
fn test_json_definition_matches_builder() {
    let definition = SpecDefinition::from_json(
        r#"{
            "mappings": [
                { "kind": "text", "selector": "title" },
                { "kind": "integer", "selector": "released_in" },
                { "kind": "many", "selector": "tracks/track", "key": "tracks", "mappings": [
                    { "kind": "attribute", "attribute": "code", "key": "isrc" },
                    { "kind": "text", "selector": "title", "key": "track_title" }
                ] }
            ],
            "within": [
                { "selector": "artist", "mappings": [
                    { "kind": "text", "selector": "name", "key": "artist_name" }
                ] }
            ]
        }"#,
    )
    .unwrap();
    let from_json = definition.compile().unwrap();
    let from_rust = Specification::build(|m| {
        m.text("title");
        m.integer("released_in");
        m.many(("tracks/track", "tracks"), |m| {
            m.attribute(("code", "isrc"));
            m.text(("title", "track_title"));
        });
        m.within("artist", |m| {
            m.text(("name", "artist_name"));
        });
    })
    .unwrap();

    assert_eq!(from_json.entries(), from_rust.entries());
    let path = fixture("base.xml");
    assert_eq!(
        from_json.extract_path(&path).unwrap(),
        from_rust.extract_path(&path).unwrap()
    );
}
