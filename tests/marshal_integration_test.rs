//! End-to-end marshalling scenarios over realistic document shapes.

use floodgate::{Cardinality, Field, MapEntity, MarshalOptions, Schema, marshal, marshal_all};
use serde_json::json;

fn user_schema() -> Schema {
    let address = Schema::new()
        .field("street", Field::string())
        .field("city", Field::string())
        .field("zip", Field::string().attribute("postal_code"));
    let post = Schema::new()
        .field("id", Field::integer())
        .field("title", Field::string())
        .field("published", Field::boolean());

    Schema::new()
        .field("id", Field::integer())
        .field("name", Field::string())
        .field("email", Field::string().lazy())
        .field("role", Field::string().default_value(json!("member")))
        .field("address", Field::nested(address))
        .field("posts", Field::relationship(post, Cardinality::OneToMany))
        .field("tags", Field::list(Field::string()))
}

fn sample_user() -> serde_json::Value {
    json!({
        "id": 7,
        "name": "Ada Lovelace",
        "email": "ada@example.com",
        "address": {
            "street": "12 Analytical Way",
            "city": "London",
            "postal_code": "E1 6AN"
        },
        "posts": [
            {"id": 1, "title": "Notes on the Engine", "published": true},
            {"id": 2, "title": "Drafts", "published": 0}
        ],
        "tags": ["math", "computing"]
    })
}

#[test]
fn test_full_document_projection() {
    let source = MapEntity::shared(sample_user()).unwrap();
    let result = marshal(&source, &user_schema(), &MarshalOptions::new()).unwrap();

    // Keys come out in schema declaration order, lazy fields omitted.
    let keys: Vec<_> = result.as_object().unwrap().keys().cloned().collect();
    assert_eq!(keys, vec!["id", "name", "role", "address", "posts", "tags"]);

    assert_eq!(result["role"], json!("member"));
    assert_eq!(result["address"]["zip"], json!("E1 6AN"));
    assert_eq!(result["posts"][0]["title"], json!("Notes on the Engine"));
    // Truthiness coercion: 0 marshals to false.
    assert_eq!(result["posts"][1]["published"], json!(false));
    assert_eq!(result["tags"], json!(["math", "computing"]));
}

#[test]
fn test_only_and_exclude_shape_the_top_level() {
    let source = MapEntity::shared(sample_user()).unwrap();

    let only = MarshalOptions::new().only(["name", "id"]);
    let result = marshal(&source, &user_schema(), &only).unwrap();
    let keys: Vec<_> = result.as_object().unwrap().keys().cloned().collect();
    assert_eq!(keys, vec!["id", "name"]);

    let exclude = MarshalOptions::new().exclude(["posts", "tags"]);
    let result = marshal(&source, &user_schema(), &exclude).unwrap();
    let object = result.as_object().unwrap();
    assert!(!object.contains_key("posts"));
    assert!(!object.contains_key("tags"));
    assert!(object.contains_key("address"));
}

#[test]
fn test_collection_endpoint_shape() {
    let schema = Schema::new()
        .field("id", Field::integer())
        .field("name", Field::string());
    let sources = vec![
        MapEntity::shared(json!({"id": 1, "name": "a"})).unwrap(),
        MapEntity::shared(json!({"id": 2, "name": "b"})).unwrap(),
    ];

    let result = marshal_all(&sources, &schema, &MarshalOptions::new()).unwrap();
    assert_eq!(result, json!([{"id": 1, "name": "a"}, {"id": 2, "name": "b"}]));
}

#[test]
fn test_depth_limit_truncates_deep_documents() {
    // Four nesting levels: member -> team -> org -> parent.
    let parent = Schema::new().field("name", Field::string());
    let org = Schema::new()
        .field("name", Field::string())
        .field("parent", Field::nested(parent));
    let team = Schema::new()
        .field("name", Field::string())
        .field("org", Field::nested(org));
    let member = Schema::new()
        .field("name", Field::string())
        .field("team", Field::nested(team));

    let source = MapEntity::shared(json!({
        "name": "Ada",
        "team": {
            "name": "Engines",
            "org": {"name": "Analytical Society", "parent": {"name": "Royal Society"}}
        }
    }))
    .unwrap();

    // depth=1 keeps the nested team and one level inside it; the org's
    // scalars survive but its own nested expansion is cut off.
    let opts = MarshalOptions::new().depth(1);
    let result = marshal(&source, &member, &opts).unwrap();
    assert_eq!(result["team"]["name"], json!("Engines"));
    assert_eq!(result["team"]["org"]["name"], json!("Analytical Society"));
    assert!(!result["team"]["org"].as_object().unwrap().contains_key("parent"));
}

#[test]
fn test_marshalling_error_identifies_offending_field() {
    let schema = Schema::new()
        .field("id", Field::integer())
        .field("score", Field::float());
    let source = MapEntity::shared(json!({"id": 1, "score": "not a number"})).unwrap();

    let err = marshal(&source, &schema, &MarshalOptions::new()).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("score"), "error should name the field: {message}");
}
