//! Drawing and replaying a full parameter set for one route.
//!
//! The four parameter groups are drawn in a fixed order - path, query,
//! header, body - and recorded under one record node, so a route's whole
//! trial shrinks as a single tree.

use std::time::Duration;

use http::Method;

use smolder_core::{
    encode_path, method_allows_body, CoreError, GenValue, RequestBody, RequestPlan, RouteSpec,
    TypeRef,
};
use smolder_gen::{
    DrawCtx, DrawTree, GenError, GeneratorHandle, NodeKind, OptionalGen, RegistrySnapshot,
    ReplayError, ValueGenerator,
};

/// The decoded values behind one trial's request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteValues {
    pub path: Vec<(String, GenValue)>,
    pub query: Vec<(String, GenValue)>,
    pub header: Vec<(String, GenValue)>,
    pub body: Option<GenValue>,
}

impl RouteValues {
    /// Report rendering: groups in deterministic order, absent optionals
    /// omitted.
    pub fn to_json(&self) -> serde_json::Value {
        let group = |values: &[(String, GenValue)]| {
            values
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect::<serde_json::Map<_, _>>()
        };
        let mut out = serde_json::Map::new();
        out.insert("path".into(), group(&self.path).into());
        out.insert("query".into(), group(&self.query).into());
        out.insert("header".into(), group(&self.header).into());
        if let Some(body) = &self.body {
            out.insert("body".into(), body.to_json());
        }
        serde_json::Value::Object(out)
    }
}

/// Resolved generators for every parameter group of one route.
pub struct RouteDraw {
    path: Vec<(String, GeneratorHandle)>,
    query: Vec<(String, GeneratorHandle)>,
    header: Vec<(String, GeneratorHandle)>,
    body: Option<GeneratorHandle>,
}

impl RouteDraw {
    /// Resolve generators for all of a route's parameters.
    pub fn resolve(route: &RouteSpec, registry: &RegistrySnapshot) -> Result<Self, GenError> {
        Self::resolve_excluding(route, registry, &[], &[], &[])
    }

    /// Resolve generators, skipping named parameters (stateful mode fills
    /// those from bundles instead).
    pub fn resolve_excluding(
        route: &RouteSpec,
        registry: &RegistrySnapshot,
        skip_path: &[String],
        skip_query: &[String],
        skip_header: &[String],
    ) -> Result<Self, GenError> {
        let mut path = Vec::new();
        for (name, ty) in route.path_params() {
            if skip_path.contains(name) {
                continue;
            }
            path.push((name.clone(), registry.resolve(ty)?));
        }

        let mut query = Vec::new();
        for param in route.query_params() {
            if skip_query.contains(&param.name) {
                continue;
            }
            let gen = registry.resolve(&param.ty)?;
            let gen = if param.required {
                gen
            } else {
                std::sync::Arc::new(OptionalGen::new(gen)) as GeneratorHandle
            };
            query.push((param.name.clone(), gen));
        }

        let mut header = Vec::new();
        for (name, ty) in route.header_params() {
            if skip_header.contains(name) {
                continue;
            }
            header.push((name.clone(), registry.resolve(ty)?));
        }

        let body = match route.body() {
            Some(ty) => Some(registry.resolve(ty)?),
            None => None,
        };

        Ok(Self { path, query, header, body })
    }

    /// Draw all groups, producing values plus the trial's combined tree.
    pub fn draw(&self, ctx: &mut DrawCtx<'_>) -> (RouteValues, DrawTree) {
        let mut values = RouteValues::default();
        let mut groups = Vec::with_capacity(4);

        groups.push(Self::draw_group(&self.path, &mut values.path, ctx));
        groups.push(Self::draw_group(&self.query, &mut values.query, ctx));
        groups.push(Self::draw_group(&self.header, &mut values.header, ctx));

        let body_children = match &self.body {
            Some(gen) => {
                let (value, tree) = gen.draw(ctx);
                values.body = Some(value);
                vec![tree]
            }
            None => Vec::new(),
        };
        groups.push(DrawTree::node(NodeKind::Record, body_children));

        (values, DrawTree::node(NodeKind::Record, groups))
    }

    fn draw_group(
        params: &[(String, GeneratorHandle)],
        out: &mut Vec<(String, GenValue)>,
        ctx: &mut DrawCtx<'_>,
    ) -> DrawTree {
        let mut children = Vec::with_capacity(params.len());
        for (name, gen) in params {
            let (value, tree) = gen.draw(ctx);
            children.push(tree);
            if !value.is_null() {
                out.push((name.clone(), value));
            }
        }
        DrawTree::node(NodeKind::Record, children)
    }

    /// Rebuild values from a (possibly shrunken) trial tree.
    pub fn replay(&self, tree: &DrawTree) -> Result<RouteValues, ReplayError> {
        let DrawTree::Node { kind: NodeKind::Record, children } = tree else {
            return Err(ReplayError::Structure("expected a trial record"));
        };
        let [path_tree, query_tree, header_tree, body_tree] = children.as_slice() else {
            return Err(ReplayError::Structure("trial record needs four groups"));
        };

        let mut values = RouteValues::default();
        Self::replay_group(&self.path, path_tree, &mut values.path)?;
        Self::replay_group(&self.query, query_tree, &mut values.query)?;
        Self::replay_group(&self.header, header_tree, &mut values.header)?;

        let DrawTree::Node { kind: NodeKind::Record, children: body_children } = body_tree else {
            return Err(ReplayError::Structure("expected a body group"));
        };
        match (&self.body, body_children.as_slice()) {
            (None, []) => {}
            (Some(gen), [tree]) => values.body = Some(gen.replay(tree)?),
            _ => return Err(ReplayError::Structure("body group arity mismatch")),
        }

        Ok(values)
    }

    fn replay_group(
        params: &[(String, GeneratorHandle)],
        tree: &DrawTree,
        out: &mut Vec<(String, GenValue)>,
    ) -> Result<(), ReplayError> {
        let DrawTree::Node { kind: NodeKind::Record, children } = tree else {
            return Err(ReplayError::Structure("expected a parameter group"));
        };
        if children.len() != params.len() {
            return Err(ReplayError::Structure("parameter group arity mismatch"));
        }
        for ((name, gen), child) in params.iter().zip(children) {
            let value = gen.replay(child)?;
            if !value.is_null() {
                out.push((name.clone(), value));
            }
        }
        Ok(())
    }
}

/// Render values into a transport-ready request.
///
/// Query values render scalars directly; a drawn sequence repeats the
/// parameter name per element.
pub fn build_plan(
    route: &RouteSpec,
    method: &Method,
    values: &RouteValues,
    timeout: Duration,
) -> Result<RequestPlan, CoreError> {
    let path = encode_path(route.pattern(), &values.path)?;
    let mut plan = RequestPlan::new(method.clone(), path, timeout);

    for (name, value) in &values.query {
        match value {
            GenValue::Seq(items) => {
                for item in items {
                    if let Some(rendered) = item.render_scalar() {
                        plan.query.push((name.clone(), rendered));
                    }
                }
            }
            other => {
                if let Some(rendered) = other.render_scalar() {
                    plan.query.push((name.clone(), rendered));
                }
            }
        }
    }

    for (name, value) in &values.header {
        let Some(rendered) = value.render_scalar() else { continue };
        let (Ok(header_name), Ok(header_value)) = (
            name.parse::<http::HeaderName>(),
            rendered.parse::<http::HeaderValue>(),
        ) else {
            continue;
        };
        plan.headers.insert(header_name, header_value);
    }

    if let Some(body) = &values.body {
        if method_allows_body(method) {
            let bytes = serde_json::to_vec(&body.to_json()).unwrap_or_default();
            plan.body = Some(RequestBody::json(bytes));
            plan.headers.insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("application/json"),
            );
        }
    }

    Ok(plan)
}

/// Resolve every parameter type of a route eagerly so unsupported types
/// surface before the first trial.
pub fn preflight_types(route: &RouteSpec, registry: &RegistrySnapshot) -> Result<(), GenError> {
    for (_, ty) in route.path_params() {
        registry.resolve(ty)?;
    }
    for param in route.query_params() {
        registry.resolve(&param.ty)?;
    }
    for (_, ty) in route.header_params() {
        registry.resolve(ty)?;
    }
    if let Some(ty) = route.body() {
        registry.resolve(ty)?;
    }
    // Response contracts are validated, not generated, but an unresolvable
    // contract schema is still a spec bug worth surfacing here.
    for contract in route.responses() {
        if let TypeRef::Ref(name) = &contract.schema {
            if !registry.schemas().contains(name) {
                return Err(GenError::UnresolvedRef(name.clone()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use smolder_core::{Field, TypeRef};
    use smolder_gen::TypeRegistry;

    fn route() -> RouteSpec {
        RouteSpec::builder("/items/{id:int}")
            .method(Method::POST)
            .query("verbose", TypeRef::BOOL, false)
            .body(TypeRef::record(vec![Field::required("name", TypeRef::STR)]))
            .build()
            .unwrap()
    }

    #[test]
    fn draw_replay_round_trips() {
        let route = route();
        let registry = TypeRegistry::new().snapshot();
        let draw = RouteDraw::resolve(&route, &registry).unwrap();
        for seed in 0..30u64 {
            let mut rng = smolder_gen::rng_for(seed);
            let mut ctx = DrawCtx::new(&mut rng, 100, 3);
            let (values, tree) = draw.draw(&mut ctx);
            assert_eq!(draw.replay(&tree).unwrap(), values);
        }
    }

    #[test]
    fn plan_renders_path_query_and_body() {
        let route = route();
        let values = RouteValues {
            path: vec![("id".into(), GenValue::Int(7))],
            query: vec![("verbose".into(), GenValue::Bool(true))],
            header: vec![],
            body: Some(GenValue::Record(vec![("name".into(), GenValue::Str("x".into()))])),
        };
        let plan = build_plan(&route, &Method::POST, &values, Duration::from_secs(1)).unwrap();
        assert_eq!(plan.uri(), "/items/7?verbose=true");
        let body = plan.body.unwrap();
        assert_eq!(body.content_type, "application/json");
        assert_eq!(body.bytes.as_ref(), br#"{"name":"x"}"#);
    }

    #[test]
    fn header_params_render_into_the_header_map() {
        let route = RouteSpec::builder("/ping")
            .method(Method::GET)
            .header("X-Request-Source", TypeRef::STR)
            .build()
            .unwrap();
        let values = RouteValues {
            path: vec![],
            query: vec![],
            header: vec![("X-Request-Source".into(), GenValue::Str("probe".into()))],
            body: None,
        };
        let plan = build_plan(&route, &Method::GET, &values, Duration::from_secs(1)).unwrap();
        assert_eq!(plan.headers.get("x-request-source").unwrap(), "probe");
    }

    #[test]
    fn seq_query_value_repeats_the_name() {
        let route = RouteSpec::builder("/search")
            .method(Method::GET)
            .query("tag", TypeRef::seq(TypeRef::INT, 0, 5), true)
            .build()
            .unwrap();
        let values = RouteValues {
            path: vec![],
            query: vec![(
                "tag".into(),
                GenValue::Seq(vec![GenValue::Int(1), GenValue::Int(2)]),
            )],
            header: vec![],
            body: None,
        };
        let plan = build_plan(&route, &Method::GET, &values, Duration::from_secs(1)).unwrap();
        assert_eq!(plan.uri(), "/search?tag=1&tag=2");
    }
}
