//! State-machine mode scenarios: bundle chaining, failure shrinking to a
//! minimal call sequence, and bundle discipline.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http::{HeaderMap, Method, StatusCode};

use smolder_core::{Field, RequestPlan, ResponseData, RouteSpec, TypeRef};
use smolder_engine::{
    AuthTable, ExtractExpr, FailureKind, FnTransport, Link, LinkGraph, OpId, ParamSlot,
    StateMachineRunner, StatefulSettings, StatusValidator,
};
use smolder_gen::TypeRegistry;

fn json_response(status: u16, body: serde_json::Value) -> ResponseData {
    let mut headers = HeaderMap::new();
    headers.insert(http::header::CONTENT_TYPE, "application/json".parse().unwrap());
    ResponseData::new(
        StatusCode::from_u16(status).unwrap(),
        headers,
        serde_json::to_vec(&body).unwrap(),
    )
}

fn empty(status: u16) -> ResponseData {
    ResponseData::new(StatusCode::from_u16(status).unwrap(), HeaderMap::new(), Vec::new())
}

fn body_name_len(plan: &RequestPlan) -> i64 {
    let body: serde_json::Value =
        serde_json::from_slice(&plan.body.as_ref().unwrap().bytes).unwrap();
    body["name"].as_str().map(|s| s.len() as i64).unwrap_or(0)
}

fn user_routes() -> Vec<RouteSpec> {
    vec![
        RouteSpec::builder("/users")
            .method(Method::POST)
            .body(TypeRef::record(vec![Field::required("name", TypeRef::STR)]))
            .respond(
                201,
                "application/json",
                TypeRef::record(vec![Field::required("id", TypeRef::INT)]),
            )
            .build()
            .unwrap(),
        RouteSpec::builder("/users/{id:int}").method(Method::GET).build().unwrap(),
    ]
}

fn user_links() -> LinkGraph {
    LinkGraph::explicit(vec![Link {
        producer: OpId::new(Method::POST, "/users"),
        expr: ExtractExpr::parse("$.body#/id").unwrap(),
        bundle: "user_ids".into(),
        consumer: OpId::new(Method::GET, "/users/{id:int}"),
        param: ParamSlot::Path("id".into()),
    }])
}

fn runner_settings(step_count: usize, max_sequences: u32, seed: u64) -> StatefulSettings {
    StatefulSettings { step_count, max_sequences, seed, ..StatefulSettings::default() }
}

#[tokio::test]
async fn consumers_only_ever_see_produced_ids() {
    // POST creates a user with a deterministic id; GET 200s only for ids
    // that were actually created, 404 otherwise.
    let created: Arc<Mutex<HashSet<i64>>> = Arc::default();
    let get_statuses: Arc<Mutex<Vec<u16>>> = Arc::default();
    let transport = {
        let created = created.clone();
        let get_statuses = get_statuses.clone();
        Arc::new(FnTransport::new(move |plan: &RequestPlan| {
            if plan.method == Method::POST {
                let id = body_name_len(plan);
                created.lock().unwrap().insert(id);
                Ok(json_response(201, serde_json::json!({ "id": id })))
            } else {
                let id: i64 = plan.path.split('/').nth(2).unwrap().parse().unwrap();
                let status = if created.lock().unwrap().contains(&id) { 200 } else { 404 };
                get_statuses.lock().unwrap().push(status);
                Ok(empty(status))
            }
        }))
    };

    let routes = user_routes();
    let graph = user_links();
    let runner = StateMachineRunner {
        routes: &routes,
        graph: &graph,
        registry: TypeRegistry::new().snapshot(),
        validator: Arc::new(StatusValidator::fail_on_5xx()),
        auth: AuthTable::none(),
        transport: transport.as_ref(),
        settings: runner_settings(10, 5, 1),
    };
    let report = runner.run().await;

    assert!(report.failure.is_none(), "{:?}", report.failure);
    assert!(report.fatal.is_none());
    assert_eq!(report.sequences, 5);
    // Every GET drew its id from the bundle, so every GET saw a 200.
    let statuses = get_statuses.lock().unwrap();
    assert!(statuses.iter().all(|s| *s == 200), "{statuses:?}");
    // Coverage counted the link traversals that happened.
    if !statuses.is_empty() {
        let traversals: u32 = report.coverage.links.values().sum();
        assert_eq!(traversals as usize, statuses.len());
    }
}

#[tokio::test]
async fn failing_chain_shrinks_to_its_minimal_prefix() {
    // Two-stage chain: users produce posts, posts feed a GET that always
    // 500s. The minimal failing sequence is exactly the three-step chain.
    let routes = vec![
        RouteSpec::builder("/users")
            .method(Method::POST)
            .body(TypeRef::record(vec![Field::required("name", TypeRef::STR)]))
            .respond(
                201,
                "application/json",
                TypeRef::record(vec![Field::required("id", TypeRef::INT)]),
            )
            .build()
            .unwrap(),
        RouteSpec::builder("/users/{user_id:int}/posts")
            .method(Method::POST)
            .body(TypeRef::record(vec![Field::required("title", TypeRef::STR)]))
            .respond(
                201,
                "application/json",
                TypeRef::record(vec![Field::required("id", TypeRef::INT)]),
            )
            .build()
            .unwrap(),
        RouteSpec::builder("/posts/{post_id:int}").method(Method::GET).build().unwrap(),
    ];
    let graph = LinkGraph::explicit(vec![
        Link {
            producer: OpId::new(Method::POST, "/users"),
            expr: ExtractExpr::parse("$.body#/id").unwrap(),
            bundle: "user_ids".into(),
            consumer: OpId::new(Method::POST, "/users/{user_id:int}/posts"),
            param: ParamSlot::Path("user_id".into()),
        },
        Link {
            producer: OpId::new(Method::POST, "/users/{user_id:int}/posts"),
            expr: ExtractExpr::parse("$.body#/id").unwrap(),
            bundle: "post_ids".into(),
            consumer: OpId::new(Method::GET, "/posts/{post_id:int}"),
            param: ParamSlot::Path("post_id".into()),
        },
    ]);

    let transport = Arc::new(FnTransport::new(|plan: &RequestPlan| {
        if plan.method == Method::POST && plan.path == "/users" {
            Ok(json_response(201, serde_json::json!({ "id": body_name_len(plan) })))
        } else if plan.method == Method::POST {
            let user_id: i64 = plan.path.split('/').nth(2).unwrap().parse().unwrap();
            Ok(json_response(201, serde_json::json!({ "id": user_id + 1000 })))
        } else {
            Ok(empty(500))
        }
    }));

    let runner = StateMachineRunner {
        routes: &routes,
        graph: &graph,
        registry: TypeRegistry::new().snapshot(),
        validator: Arc::new(StatusValidator::fail_on_5xx()),
        auth: AuthTable::none(),
        transport: transport.as_ref(),
        settings: runner_settings(12, 20, 1),
    };
    let report = runner.run().await;

    let failure = report.failure.expect("the chain must eventually reach the 500");
    assert_eq!(failure.kind, FailureKind::Server5xx);
    assert_eq!(failure.operation, "GET /posts/{post_id:int}");
    // No trailing or interleaved steps survive shrinking: exactly the two
    // producers remain before the failing GET.
    let prior: Vec<&str> = failure.steps.iter().map(|s| s.operation.as_str()).collect();
    assert_eq!(prior, ["POST /users", "POST /users/{user_id:int}/posts"]);
}

#[tokio::test]
async fn failed_producers_fill_no_bundles() {
    // The producing rule always 500s, so its bundle stays empty and the
    // consumer never fires.
    let transport = Arc::new(FnTransport::new(|plan: &RequestPlan| {
        assert_eq!(plan.method, Method::POST, "consumer fired from an empty bundle");
        Ok(empty(500))
    }));
    let routes = user_routes();
    let graph = user_links();
    let runner = StateMachineRunner {
        routes: &routes,
        graph: &graph,
        registry: TypeRegistry::new().snapshot(),
        validator: Arc::new(StatusValidator::fail_on_5xx()),
        auth: AuthTable::none(),
        transport: transport.as_ref(),
        settings: runner_settings(10, 3, 1),
    };
    let report = runner.run().await;

    let failure = report.failure.expect("the failing POST is reported");
    assert_eq!(failure.operation, "POST /users");
    assert!(failure.steps.is_empty(), "no prior steps exist");
    // The body shrank to the minimal record.
    assert_eq!(failure.values["body"]["name"], serde_json::json!("0"));
    assert!(!report.coverage.operations.contains_key("GET /users/{id:int}"));
}

#[tokio::test]
async fn stateful_runs_are_deterministic() {
    let make_report = || async {
        let transport = Arc::new(FnTransport::new(|plan: &RequestPlan| {
            if plan.method == Method::POST {
                Ok(json_response(201, serde_json::json!({ "id": body_name_len(plan) })))
            } else {
                let id: i64 = plan.path.split('/').nth(2).unwrap().parse().unwrap();
                if id >= 3 {
                    Ok(empty(500))
                } else {
                    Ok(empty(200))
                }
            }
        }));
        let routes = user_routes();
        let graph = user_links();
        let runner = StateMachineRunner {
            routes: &routes,
            graph: &graph,
            registry: TypeRegistry::new().snapshot(),
            validator: Arc::new(StatusValidator::fail_on_5xx()),
            auth: AuthTable::none(),
            transport: transport.as_ref(),
            settings: runner_settings(10, 10, 5),
        };
        let report = runner.run().await;
        (
            serde_json::to_string(&report.failure).unwrap(),
            report.steps_executed,
            serde_json::to_string(&report.coverage).unwrap(),
        )
    };

    assert_eq!(make_report().await, make_report().await);
}

#[tokio::test]
async fn total_timeout_reports_partial_results() {
    let transport = Arc::new(FnTransport::new(|_plan: &RequestPlan| Ok(empty(200))));
    let routes = user_routes();
    let graph = user_links();
    let runner = StateMachineRunner {
        routes: &routes,
        graph: &graph,
        registry: TypeRegistry::new().snapshot(),
        validator: Arc::new(StatusValidator::fail_on_5xx()),
        auth: AuthTable::none(),
        transport: transport.as_ref(),
        settings: StatefulSettings {
            total_timeout: Duration::ZERO,
            ..runner_settings(10, 10, 1)
        },
    };
    let report = runner.run().await;
    assert!(report.timed_out);
    assert_eq!(report.sequences, 0);
    assert!(report.failure.is_none());
}
