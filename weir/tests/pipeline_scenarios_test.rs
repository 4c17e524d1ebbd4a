//! End-to-end pipeline assembly tests, one per scenario row, run through
//! `Pipeline::from_config` rather than by constructing a transform struct
//! directly — these exercise the registry, schema validation, and
//! handlebars config templating together, the way a real deployment would.
use weir::runtime::{Context, Pipeline};
use weir::Message;

#[tokio::test]
async fn scenario_1_string_match_find_all_on_raw_payload() {
    let yaml = "
transforms:
  - type: string_match_find_all
    settings:
      pattern: \"\\\\d+\"
";
    let pipeline = Pipeline::from_config(yaml).await.unwrap();
    let ctx = Context::new();

    let out = pipeline.process(&ctx, Message::Data(b"a1 b22 c333".to_vec())).await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(out[0].data()).unwrap();
    assert_eq!(v, serde_json::json!(["1", "22", "333"]));
}

#[tokio::test]
async fn scenario_2_object_to_string() {
    let yaml = "
transforms:
  - type: object_to_string
    settings:
      object:
        key: a
        set_key: b
";
    let pipeline = Pipeline::from_config(yaml).await.unwrap();
    let ctx = Context::new();

    let mut msg = Message::new();
    msg.set_value("a", serde_json::json!(42)).unwrap();

    let out = pipeline.process(&ctx, msg).await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(out[0].data()).unwrap();
    assert_eq!(v, serde_json::json!({"a": 42, "b": "42"}));
}

#[tokio::test]
async fn scenario_3_str_capture_named_group_on_raw_payload() {
    let yaml = "
transforms:
  - type: str_capture_named_group
    settings:
      expression: \"(?P<b>[a-z]+) (?P<d>[a-z]+)\"
";
    let pipeline = Pipeline::from_config(yaml).await.unwrap();
    let ctx = Context::new();

    let out = pipeline.process(&ctx, Message::Data(b"c e".to_vec())).await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(out[0].data()).unwrap();
    assert_eq!(v, serde_json::json!({"b": "c", "d": "e"}));
}

#[tokio::test]
async fn scenario_4_meta_for_each_applies_child_per_element() {
    let yaml = "
transforms:
  - type: meta_for_each
    settings:
      key: a
      set_key: r
      transform:
        type: object_to_string
        settings:
          object:
            key: x
            set_key: y
";
    let pipeline = Pipeline::from_config(yaml).await.unwrap();
    let ctx = Context::new();

    let mut msg = Message::new();
    msg.set_value("a", serde_json::json!([{"x": 1}, {"x": 2}])).unwrap();

    let out = pipeline.process(&ctx, msg).await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(out[0].data()).unwrap();
    assert_eq!(v["a"], serde_json::json!([{"x": 1}, {"x": 2}]));
    assert_eq!(v["r"], serde_json::json!([{"y": "1"}, {"y": "2"}]));
}

#[tokio::test]
async fn scenario_6_kv_enrich_json_lines_lookup() {
    let dir = std::env::temp_dir();
    let path = dir.join(format!("weir-scenario-6-{}.jsonl", std::process::id()));
    std::fs::write(&path, b"{\"k\":\"v1\"}\n{\"k\":\"v2\"}\n").unwrap();

    let yaml = format!(
        "
transforms:
  - type: kv_enrich
    settings:
      object:
        key: lookup
        set_key: found
      kv:
        type: json_file
        settings:
          file: \"{}\"
          is_lines: true
",
        path.display()
    );

    let pipeline = Pipeline::from_config(&yaml).await.unwrap();
    let ctx = Context::new();

    let mut msg = Message::new();
    msg.set_value("lookup", serde_json::json!("k")).unwrap();

    let out = pipeline.process(&ctx, msg).await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(out[0].data()).unwrap();
    assert_eq!(v["found"], serde_json::json!("v1"));

    std::fs::remove_file(&path).ok();
}

#[tokio::test]
async fn control_messages_flow_through_a_multi_transform_pipeline_unchanged() {
    let yaml = "
transforms:
  - type: object_to_string
    settings:
      object:
        key: a
        set_key: b
  - type: str_capture_named_group
    settings:
      object:
        key: b
        set_key: c
      expression: \"(?P<d>\\\\d+)\"
";
    let pipeline = Pipeline::from_config(yaml).await.unwrap();
    let ctx = Context::new();

    let out = pipeline.process(&ctx, Message::control()).await.unwrap();
    assert_eq!(out, vec![Message::control()]);
}
