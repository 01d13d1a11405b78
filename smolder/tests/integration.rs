//! Whole-stack integration: OpenAPI ingestion, schema validation, and
//! inferred stateful links, glued through the facade crate.

use std::sync::Arc;

use http::{HeaderMap, StatusCode};

use smolder::prelude::*;
use smolder::{
    routes_from_openapi, CompositeValidator, ExtractedRoutes, FnTransport, LinkGraph,
    RequestPlan, ResponseData, SchemaValidator, StateMachineRunner, StatefulSettings,
    Validator,
};

fn openapi_doc() -> serde_json::Value {
    serde_json::json!({
        "paths": {
            "/users": {
                "post": {
                    "operationId": "create_user",
                    "requestBody": {"content": {"application/json": {"schema":
                        {"$ref": "#/components/schemas/NewUser"}}}},
                    "responses": {
                        "201": {"content": {"application/json": {"schema":
                            {"$ref": "#/components/schemas/User"}}}}
                    }
                }
            },
            "/users/{user_id}": {
                "get": {
                    "operationId": "get_user",
                    "parameters": [
                        {"name": "user_id", "in": "path", "required": true,
                         "schema": {"type": "integer"}}
                    ],
                    "responses": {}
                }
            }
        },
        "components": {"schemas": {
            "NewUser": {"type": "object",
                        "properties": {"name": {"type": "string"}},
                        "required": ["name"]},
            "User": {"type": "object",
                     "properties": {"id": {"type": "integer"},
                                    "name": {"type": "string"}},
                     "required": ["id", "name"]}
        }}
    })
}

fn json_response(status: u16, body: serde_json::Value) -> ResponseData {
    let mut headers = HeaderMap::new();
    headers.insert(http::header::CONTENT_TYPE, "application/json".parse().unwrap());
    ResponseData::new(
        StatusCode::from_u16(status).unwrap(),
        headers,
        serde_json::to_vec(&body).unwrap(),
    )
}

fn name_of(plan: &RequestPlan) -> String {
    let body: serde_json::Value =
        serde_json::from_slice(&plan.body.as_ref().unwrap().bytes).unwrap();
    body["name"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn openapi_routes_run_with_schema_validation() {
    tracing_subscriber::fmt().with_env_filter("smolder=debug").try_init().ok();
    let ExtractedRoutes { routes, schemas } = routes_from_openapi(&openapi_doc()).unwrap();
    assert_eq!(routes.len(), 2);

    let transport = Arc::new(FnTransport::new(|plan: &RequestPlan| {
        if plan.method == Method::POST {
            let name = name_of(plan);
            Ok(json_response(201, serde_json::json!({"id": name.len(), "name": name})))
        } else {
            Ok(json_response(200, serde_json::json!({"ok": true})))
        }
    }));

    let validator: Arc<dyn Validator> = Arc::new(
        CompositeValidator::default()
            .push(Arc::new(StatusValidator::fail_on_5xx()))
            .push(Arc::new(SchemaValidator::new(schemas.clone()))),
    );

    let registry = TypeRegistry::new();
    registry.set_schemas(schemas);
    let engine = smolder::Engine::new(transport)
        .with_registry(registry)
        .with_validator(validator)
        .with_settings(RunSettings { max_examples: 25, seed: 4, ..RunSettings::default() });
    let report = engine.run(&routes, &RouteFilter::all()).await;

    assert!(report.all_passed(), "{:#?}", report.routes);
    assert_eq!(report.total_trials, 50);
}

#[tokio::test]
async fn schema_violations_are_caught_and_shrunk() {
    let ExtractedRoutes { routes, schemas } = routes_from_openapi(&openapi_doc()).unwrap();

    // The server drops the `name` field from its 201 response, violating
    // the declared User schema.
    let transport = Arc::new(FnTransport::new(|plan: &RequestPlan| {
        if plan.method == Method::POST {
            Ok(json_response(201, serde_json::json!({"id": 1})))
        } else {
            Ok(json_response(200, serde_json::json!({})))
        }
    }));

    let validator: Arc<dyn Validator> =
        Arc::new(SchemaValidator::new(schemas.clone()));
    let registry = TypeRegistry::new();
    registry.set_schemas(schemas);
    let engine = smolder::Engine::new(transport)
        .with_registry(registry)
        .with_validator(validator)
        .with_settings(RunSettings { max_examples: 10, seed: 4, ..RunSettings::default() });
    let report = engine.run(&routes, &RouteFilter::all()).await;

    let post = report.routes.iter().find(|r| r.operation.starts_with("POST")).unwrap();
    let failure = post.failure.as_ref().expect("schema violation expected");
    assert_eq!(failure.kind, FailureKind::SchemaViolation);
    // The body shrank to the minimal record that still triggers the bug.
    assert_eq!(failure.values["body"]["name"], serde_json::json!("0"));
}

#[tokio::test]
async fn inferred_links_drive_stateful_mode() {
    let ExtractedRoutes { routes, schemas } = routes_from_openapi(&openapi_doc()).unwrap();
    let graph = LinkGraph::infer(&routes, &schemas);
    assert!(!graph.is_empty(), "id → user_id edge should be inferred");

    let transport = Arc::new(FnTransport::new(|plan: &RequestPlan| {
        if plan.method == Method::POST {
            let name = name_of(plan);
            Ok(json_response(201, serde_json::json!({"id": name.len(), "name": name})))
        } else {
            // Ids are name lengths, so anything in 1..=100 exists.
            let id: i64 = plan.path.split('/').nth(2).unwrap().parse().unwrap();
            if (1..=100).contains(&id) {
                Ok(json_response(200, serde_json::json!({"ok": true})))
            } else {
                Ok(json_response(500, serde_json::json!({"error": "ghost"})))
            }
        }
    }));

    let registry = TypeRegistry::new();
    registry.set_schemas(schemas.clone());
    let runner = StateMachineRunner {
        routes: &routes,
        graph: &graph,
        registry: registry.snapshot(),
        validator: Arc::new(StatusValidator::fail_on_5xx()),
        auth: AuthTable::none(),
        transport: transport.as_ref(),
        settings: StatefulSettings {
            step_count: 8,
            max_sequences: 4,
            seed: 11,
            ..StatefulSettings::default()
        },
    };
    let report = runner.run().await;
    assert!(report.fatal.is_none(), "{:?}", report.fatal);
    assert!(report.failure.is_none(), "{:#?}", report.failure);
    // The GET only ever fires through the inferred link, so any firing
    // traversed it.
    if report.coverage.operations.contains_key("GET /users/{user_id}") {
        assert!(report.coverage.links.values().sum::<u32>() > 0);
    }
}
