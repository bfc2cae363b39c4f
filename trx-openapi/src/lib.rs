//! OpenAPI document generation (§4.6, SPEC_FULL.md §4.6 expansion).
//!
//! Builds the `/swagger.json` body directly as a `serde_json::Value`
//! (grounded on the reference framework's `build_spec`, which assembles a
//! JSON document straight from route metadata rather than a typed OpenAPI
//! object model — here, from `RecordDecl`/`ProcedureDecl` instead of the
//! reference framework's macro-collected `RouteInfo`) and renders the
//! minimal CDN-loading Swagger UI HTML shell for `GET /`.

use serde_json::{json, Map, Value};

use trx_core::{Module, PrimitiveType, ProcedureDecl, RecordDecl};

fn primitive_schema(ty: PrimitiveType) -> Value {
    match ty {
        PrimitiveType::Integer => json!({ "type": "integer" }),
        PrimitiveType::Decimal => json!({ "type": "number" }),
        PrimitiveType::Boolean => json!({ "type": "boolean" }),
        PrimitiveType::String => json!({ "type": "string" }),
        PrimitiveType::Date => json!({ "type": "string", "format": "date" }),
        PrimitiveType::Time => json!({ "type": "string", "format": "time" }),
        PrimitiveType::Timestamp => json!({ "type": "string", "format": "date-time" }),
    }
}

fn record_schema(record: &RecordDecl) -> Value {
    let mut properties = Map::new();
    for field in &record.fields {
        let key = field.json_alias.clone().unwrap_or_else(|| field.name.clone());
        properties.insert(key, primitive_schema(field.field_type));
    }
    json!({
        "type": "object",
        "properties": properties,
    })
}

/// Builds the `components.schemas` map from every `RecordDecl` in the
/// module (§4.6: "records become `#/components/schemas/<Name>`").
fn build_schemas(module: &Module) -> Map<String, Value> {
    let mut schemas = Map::new();
    for record in &module.records {
        schemas.insert(record.name.clone(), record_schema(record));
    }
    schemas
}

fn operation_for(proc: &ProcedureDecl) -> Value {
    let mut operation = Map::new();
    operation.insert("operationId".to_string(), json!(proc.name));

    let mut params = Vec::new();
    for p in &proc.path_parameters {
        params.push(json!({
            "name": p.name,
            "in": "path",
            "required": true,
            "schema": primitive_schema(p.param_type),
        }));
    }
    if !params.is_empty() {
        operation.insert("parameters".to_string(), json!(params));
    }

    if let Some(input) = &proc.input {
        operation.insert(
            "requestBody".to_string(),
            json!({
                "required": true,
                "content": {
                    "application/json": {
                        "schema": { "$ref": format!("#/components/schemas/{}", input.type_name) }
                    }
                }
            }),
        );
    }

    let success_status = match proc.effective_method().as_str() {
        "POST" => "201",
        "DELETE" => "204",
        _ => "200",
    };
    let mut responses = Map::new();
    if success_status == "204" {
        responses.insert(success_status.to_string(), json!({ "description": "No Content" }));
    } else if let Some(output) = &proc.output {
        responses.insert(
            success_status.to_string(),
            json!({
                "description": "Successful response",
                "content": {
                    "application/json": {
                        "schema": { "$ref": format!("#/components/schemas/{}", output.type_name) }
                    }
                }
            }),
        );
    } else {
        responses.insert(success_status.to_string(), json!({ "description": "Successful response" }));
    }
    operation.insert("responses".to_string(), Value::Object(responses));

    Value::Object(operation)
}

/// Builds the `paths` map from every exported procedure (§4.6).
fn build_paths(module: &Module) -> Map<String, Value> {
    let mut paths: Map<String, Value> = Map::new();
    for proc in module.exported_procedures() {
        let Some(template) = &proc.path_template else { continue };
        let method = proc.effective_method().to_lowercase();
        let entry = paths.entry(template.clone()).or_insert_with(|| json!({}));
        if let Some(obj) = entry.as_object_mut() {
            obj.insert(method, operation_for(proc));
        }
    }
    paths
}

/// Builds the OpenAPI 3.0 document for `module` (§4.6, §1 scope note:
/// JSON generation only, not a typed object model).
pub fn build_spec(module: &Module, title: &str, version: &str) -> Value {
    json!({
        "openapi": "3.0.3",
        "info": {
            "title": title,
            "version": version,
        },
        "paths": build_paths(module),
        "components": {
            "schemas": build_schemas(module),
        },
    })
}

/// A minimal, self-contained HTML page loading the Swagger UI client from
/// a CDN and pointing it at `/swagger.json` (§1 scope note: no vendored
/// asset bundle).
pub fn swagger_ui_html() -> String {
    r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8"/>
<title>TRX API</title>
<link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist/swagger-ui.css"/>
</head>
<body>
<div id="swagger-ui"></div>
<script src="https://unpkg.com/swagger-ui-dist/swagger-ui-bundle.js"></script>
<script>
window.onload = function() {
  SwaggerUIBundle({ url: "/swagger.json", dom_id: "#swagger-ui" });
};
</script>
</body>
</html>
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use trx_core::{FieldDecl, ParamDecl};

    fn sample_module() -> Module {
        Module {
            records: vec![RecordDecl {
                name: "CUSTOMER".into(),
                fields: vec![FieldDecl {
                    name: "NAME".into(),
                    field_type: PrimitiveType::String,
                    length: Some(64),
                    scale: None,
                    json_alias: None,
                    omit_empty: false,
                }],
                location: None,
            }],
            tables: vec![],
            procedures: vec![ProcedureDecl {
                name: "copy".into(),
                path_template: Some("/customers/{id}".into()),
                path_parameters: vec![trx_core::PathParamDecl { name: "id".into(), param_type: PrimitiveType::Integer }],
                http_method: None,
                http_headers: vec![],
                input: Some(ParamDecl { name: "c".into(), type_name: "CUSTOMER".into() }),
                output: Some(ParamDecl { name: "r".into(), type_name: "CUSTOMER".into() }),
                is_exported: true,
                body: vec![],
                location: None,
            }],
        }
    }

    #[test]
    fn spec_includes_record_schema_and_path() {
        let spec = build_spec(&sample_module(), "TRX", "0.1.0");
        assert_eq!(spec["components"]["schemas"]["CUSTOMER"]["type"], "object");
        assert!(spec["paths"]["/customers/{id}"]["post"].is_object());
    }

    #[test]
    fn unexported_procedures_are_excluded() {
        let mut module = sample_module();
        module.procedures[0].is_exported = false;
        let spec = build_spec(&module, "TRX", "0.1.0");
        assert!(spec["paths"].as_object().unwrap().is_empty());
    }
}
