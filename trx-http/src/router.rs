//! Route matching (§4.6): compiling exported procedures' `(method,
//! pathTemplate)` pairs into a table the dispatcher can match a parsed
//! request against, plus the pre-rendered bodies for the built-in endpoints
//! that don't vary per request.

use regex::Regex;

use trx_core::{Module, TrxError};

/// One exported procedure's compiled route.
struct Route {
    method: String,
    proc_name: String,
    /// `Some` for templates with no `{param}` placeholders (§4.6 step 2:
    /// "match by exact string equality"); normalised the same way as the
    /// incoming request path (leading `/` stripped).
    exact: Option<String>,
    /// `Some` for templates containing `{param}` placeholders, compiled to
    /// `^literal([^/]+)literal…$` with every literal segment escaped.
    pattern: Option<Regex>,
    path_param_names: Vec<String>,
}

/// Outcome of matching a `(method, path)` pair against the route table
/// (§4.6, §8 "the dispatcher matches exactly the requests whose normalised
/// path satisfies the compiled regex and whose effective method equals m").
pub enum MatchOutcome {
    Matched { proc_name: String, path_params: std::collections::HashMap<String, String> },
    /// The path matched some route's template, but under a different method
    /// (§4.6: "a matched route with wrong method returns 405").
    WrongMethod,
    NoMatch,
}

/// The immutable, startup-built table of exported routes plus the
/// pre-rendered built-in endpoint bodies (§4.6, §5 "Dispatcher tables...
/// immutable after startup").
pub struct RouteTable {
    routes: Vec<Route>,
    pub openapi_json: String,
    pub swagger_html: String,
    pub procedures_json: String,
}

/// Strips a leading `/`, then strips an `api/` prefix if present (§4.6 step 1).
pub fn normalize_path(raw_path: &str) -> &str {
    let stripped = raw_path.strip_prefix('/').unwrap_or(raw_path);
    stripped.strip_prefix("api/").unwrap_or(stripped)
}

/// Compiles a `pathTemplate` like `/users/{id}` (or `/users/{id: INTEGER}`,
/// the declared-type-annotated form) into a `^...$`-anchored regex where
/// every `{…}` placeholder becomes `([^/]+)` and everything else is
/// regex-escaped (§4.6 step 2).
fn compile_template(template: &str) -> Result<Regex, TrxError> {
    let mut pattern = String::from("^");
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        pattern.push_str(&regex::escape(&rest[..open]));
        let after_open = &rest[open + 1..];
        let close = after_open
            .find('}')
            .ok_or_else(|| TrxError::internal(format!("unbalanced '{{' in path template '{template}'")))?;
        pattern.push_str("([^/]+)");
        rest = &after_open[close + 1..];
    }
    pattern.push_str(&regex::escape(rest));
    pattern.push('$');
    Regex::new(&pattern).map_err(|e| TrxError::internal(format!("invalid path template '{template}': {e}")))
}

impl RouteTable {
    /// Builds the route table from `module`'s exported procedures (§4.6),
    /// and the OpenAPI/Swagger/procedures-listing bodies (§4.6 built-in
    /// endpoints) once, up front — none of it depends on the request.
    pub fn build(module: &Module, title: &str, version: &str, default_procedure: Option<&str>) -> Result<Self, TrxError> {
        let mut routes = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for proc in module.exported_procedures() {
            let Some(template) = &proc.path_template else { continue };
            let method = proc.effective_method();
            let normalized_template = normalize_path(template);

            // §3 invariant: distinct (method, path-template) keys.
            let key = (method.clone(), normalized_template.to_string());
            if !seen.insert(key) {
                return Err(TrxError::internal(format!(
                    "duplicate (method, pathTemplate) registration for '{method} {template}'"
                )));
            }

            let path_param_names: Vec<String> = proc.path_parameters.iter().map(|p| p.name.clone()).collect();
            let (exact, pattern) = if normalized_template.contains('{') {
                (None, Some(compile_template(normalized_template)?))
            } else {
                (Some(normalized_template.to_string()), None)
            };

            routes.push(Route { method, proc_name: proc.name.clone(), exact, pattern, path_param_names });
        }

        let openapi_json = trx_openapi::build_spec(module, title, version).to_string();
        let swagger_html = trx_openapi::swagger_ui_html();
        let procedures_json = build_procedures_json(module, default_procedure).to_string();

        Ok(RouteTable { routes, openapi_json, swagger_html, procedures_json })
    }

    /// Matches `(method, normalized_path)` against the route table (§4.6,
    /// §8). Distinguishes 404 from 405 by first checking whether *any*
    /// route's template matches the path under a different method.
    pub fn match_route(&self, method: &str, normalized_path: &str) -> MatchOutcome {
        let mut path_matched_other_method = false;
        for route in &self.routes {
            let captures = if let Some(exact) = &route.exact {
                if exact == normalized_path { Some(Vec::new()) } else { None }
            } else if let Some(re) = &route.pattern {
                re.captures(normalized_path).map(|c| {
                    c.iter()
                        .skip(1)
                        .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                        .collect::<Vec<_>>()
                })
            } else {
                None
            };

            let Some(captured) = captures else { continue };

            if route.method != method {
                path_matched_other_method = true;
                continue;
            }

            let mut path_params = std::collections::HashMap::new();
            for (name, value) in route.path_param_names.iter().zip(captured.into_iter()) {
                path_params.insert(name.clone(), value);
            }
            return MatchOutcome::Matched { proc_name: route.proc_name.clone(), path_params };
        }

        if path_matched_other_method {
            MatchOutcome::WrongMethod
        } else {
            MatchOutcome::NoMatch
        }
    }
}

/// Builds the `GET /procedures` body (§4.6: `{procedures, default}`,
/// SPEC_FULL.md §4.6 expansion: each procedure additionally carries
/// `method`/`path`/`hasInput`/`hasOutput`).
fn build_procedures_json(module: &Module, default_procedure: Option<&str>) -> serde_json::Value {
    let procedures: Vec<serde_json::Value> = module
        .exported_procedures()
        .map(|p| {
            serde_json::json!({
                "name": p.name,
                "method": p.effective_method(),
                "path": p.path_template,
                "hasInput": p.input.is_some(),
                "hasOutput": p.output.is_some(),
            })
        })
        .collect();
    serde_json::json!({
        "procedures": procedures,
        "default": default_procedure,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use trx_core::{ParamDecl, PathParamDecl, PrimitiveType, ProcedureDecl};

    fn proc_with_template(name: &str, method: &str, template: &str, params: Vec<PathParamDecl>) -> ProcedureDecl {
        ProcedureDecl {
            name: name.into(),
            path_template: Some(template.into()),
            path_parameters: params,
            http_method: Some(method.into()),
            http_headers: vec![],
            input: None,
            output: Some(ParamDecl { name: "out".into(), type_name: "X".into() }),
            is_exported: true,
            body: vec![],
            location: None,
        }
    }

    fn module_with(procs: Vec<ProcedureDecl>) -> Module {
        Module { records: vec![], tables: vec![], procedures: procs }
    }

    #[test]
    fn exact_template_matches_only_exact_path() {
        let module = module_with(vec![proc_with_template("ping", "GET", "/ping", vec![])]);
        let table = RouteTable::build(&module, "t", "0.1", None).unwrap();
        assert!(matches!(table.match_route("GET", "ping"), MatchOutcome::Matched { .. }));
        assert!(matches!(table.match_route("GET", "ping/extra"), MatchOutcome::NoMatch));
    }

    #[test]
    fn templated_route_extracts_path_param_and_enforces_method() {
        let module = module_with(vec![proc_with_template(
            "get_user",
            "GET",
            "/users/{id}",
            vec![PathParamDecl { name: "id".into(), param_type: PrimitiveType::Integer }],
        )]);
        let table = RouteTable::build(&module, "t", "0.1", None).unwrap();

        match table.match_route("GET", "users/42") {
            MatchOutcome::Matched { proc_name, path_params } => {
                assert_eq!(proc_name, "get_user");
                assert_eq!(path_params.get("id").map(String::as_str), Some("42"));
            }
            _ => panic!("expected a match"),
        }

        assert!(matches!(table.match_route("POST", "users/42"), MatchOutcome::WrongMethod));
        assert!(matches!(table.match_route("GET", "users/42/extra"), MatchOutcome::NoMatch));
    }

    #[test]
    fn normalize_path_strips_leading_slash_and_api_prefix() {
        assert_eq!(normalize_path("/api/users/42"), "users/42");
        assert_eq!(normalize_path("/users/42"), "users/42");
        assert_eq!(normalize_path("users/42"), "users/42");
    }

    #[test]
    fn duplicate_method_and_template_is_rejected() {
        let module = module_with(vec![
            proc_with_template("a", "GET", "/x", vec![]),
            proc_with_template("b", "GET", "/x", vec![]),
        ]);
        assert!(RouteTable::build(&module, "t", "0.1", None).is_err());
    }
}
