//! Lowering an OpenAPI-style document into `RouteSpec`s.
//!
//! This is the one extractor shipped with the engine: it is framework
//! agnostic and covers any source that can hand over an OpenAPI document.
//! Framework-native extractors live outside the core and produce the same
//! `Vec<RouteSpec>`.

use http::Method;
use serde_json::Value;

use crate::error::CoreError;
use crate::route::{method_allows_body, RouteSpec};
use crate::typeref::{SchemaTable, TypeRef};

/// The outcome of lowering a document: routes plus the shared schema table
/// for `$ref` resolution.
#[derive(Debug, Clone)]
pub struct ExtractedRoutes {
    pub routes: Vec<RouteSpec>,
    pub schemas: SchemaTable,
}

/// Lower `paths` + `components/schemas` from an OpenAPI document.
///
/// Parameters without a usable schema default to `Str` with a warning, per
/// the ingestion contract. Unknown methods and non-JSON request bodies are
/// skipped with a warning rather than failing the whole document.
pub fn routes_from_openapi(doc: &Value) -> Result<ExtractedRoutes, CoreError> {
    let schemas = doc
        .pointer("/components/schemas")
        .map(SchemaTable::from_components)
        .transpose()?
        .unwrap_or_default();

    let mut routes = Vec::new();
    let Some(paths) = doc.get("paths").and_then(Value::as_object) else {
        return Ok(ExtractedRoutes { routes, schemas });
    };

    for (pattern, item) in paths {
        let Some(ops) = item.as_object() else { continue };
        for (method_name, op) in ops {
            let Ok(method) = method_name.to_uppercase().parse::<Method>() else {
                tracing::warn!(path = %pattern, method = %method_name, "skipping unknown method");
                continue;
            };
            if !matches!(
                method.as_str(),
                "GET" | "PUT" | "POST" | "DELETE" | "PATCH" | "HEAD" | "OPTIONS"
            ) {
                continue;
            }
            let mut builder = RouteSpec::builder(pattern).method(method.clone());

            if let Some(id) = op.get("operationId").and_then(Value::as_str) {
                builder = builder.name(id);
            }
            if let Some(desc) = op.get("description").and_then(Value::as_str) {
                builder = builder.description(desc);
            }
            if op.get("deprecated").and_then(Value::as_bool).unwrap_or(false) {
                builder = builder.deprecated(true);
            }
            if let Some(tags) = op.get("tags").and_then(Value::as_array) {
                for tag in tags.iter().filter_map(Value::as_str) {
                    builder = builder.tag(tag);
                }
            }

            for param in op
                .get("parameters")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                let Some(name) = param.get("name").and_then(Value::as_str) else { continue };
                let location = param.get("in").and_then(Value::as_str).unwrap_or("query");
                let required =
                    param.get("required").and_then(Value::as_bool).unwrap_or(false);
                let ty = match param.get("schema") {
                    Some(schema) => TypeRef::from_json_schema(schema)?,
                    None => {
                        tracing::warn!(
                            path = %pattern,
                            param = %name,
                            "parameter has no schema, defaulting to str"
                        );
                        TypeRef::STR
                    }
                };
                builder = match location {
                    "path" => builder.path_param(name, ty),
                    "header" => builder.header(name, ty),
                    _ => builder.query(name, ty, required),
                };
            }

            if method_allows_body(&method) {
                if let Some(schema) =
                    op.pointer("/requestBody/content/application~1json/schema")
                {
                    builder = builder.body(TypeRef::from_json_schema(schema)?);
                } else if op.get("requestBody").is_some() {
                    tracing::warn!(
                        path = %pattern,
                        method = %method,
                        "request body is not application/json, skipping body generation"
                    );
                }
            }

            if let Some(responses) = op.get("responses").and_then(Value::as_object) {
                for (status, resp) in responses {
                    let Ok(code) = status.parse::<u16>() else { continue };
                    if let Some(schema) =
                        resp.pointer("/content/application~1json/schema")
                    {
                        builder = builder.respond(
                            code,
                            "application/json",
                            TypeRef::from_json_schema(schema)?,
                        );
                    }
                }
            }

            routes.push(builder.build()?);
        }
    }

    Ok(ExtractedRoutes { routes, schemas })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_routes_params_and_schemas() {
        let doc = json!({
            "paths": {
                "/users/{id}": {
                    "get": {
                        "operationId": "get_user",
                        "parameters": [
                            {"name": "id", "in": "path", "required": true,
                             "schema": {"type": "integer"}},
                            {"name": "verbose", "in": "query",
                             "schema": {"type": "boolean"}}
                        ],
                        "responses": {
                            "200": {"content": {"application/json": {
                                "schema": {"$ref": "#/components/schemas/User"}}}}
                        }
                    }
                },
                "/users": {
                    "post": {
                        "requestBody": {"content": {"application/json": {
                            "schema": {"$ref": "#/components/schemas/User"}}}},
                        "responses": {}
                    }
                }
            },
            "components": {"schemas": {
                "User": {"type": "object",
                         "properties": {"id": {"type": "integer"}},
                         "required": ["id"]}
            }}
        });

        let extracted = routes_from_openapi(&doc).unwrap();
        assert_eq!(extracted.routes.len(), 2);
        assert!(extracted.schemas.contains("User"));

        let get = extracted
            .routes
            .iter()
            .find(|r| r.path() == "/users/{id}")
            .unwrap();
        assert_eq!(get.path_params(), &[("id".to_string(), TypeRef::INT)]);
        assert_eq!(get.query_params().len(), 1);
        assert!(get.response_for(200).is_some());

        let post = extracted.routes.iter().find(|r| r.path() == "/users").unwrap();
        assert_eq!(post.body(), Some(&TypeRef::Ref("User".into())));
    }

    #[test]
    fn untyped_param_defaults_to_str() {
        let doc = json!({
            "paths": {"/things/{key}": {"get": {
                "parameters": [{"name": "key", "in": "path", "required": true}],
                "responses": {}
            }}}
        });
        let extracted = routes_from_openapi(&doc).unwrap();
        assert_eq!(
            extracted.routes[0].path_params(),
            &[("key".to_string(), TypeRef::STR)]
        );
    }
}
