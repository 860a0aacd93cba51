//! Render function registry
//!
//! Fields with `fieldRenderOptions` compute their options at build time
//! from a named function. Functions are registered under `Module::method`
//! and receive the object's context row plus the configured identifier.

use dataobjects_core::{EngineError, EngineResult, Row, path};
use dataobjects_model::{
    FieldOption, FieldOptions, FieldRegistry, OutputSpec, RenderFunctionRef, RenderOutput,
};
use indexmap::IndexMap;
use tracing::debug;

/// A render function: context row and identifier in, option rows out
pub type RenderFn = fn(&Row, &str) -> Vec<Row>;

#[derive(Clone, Default)]
pub struct RenderRegistry {
    functions: IndexMap<String, RenderFn>,
}

impl std::fmt::Debug for RenderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderRegistry")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `function` under `Module::method`
    pub fn register(&mut self, key: impl Into<String>, function: RenderFn) -> &mut Self {
        self.functions.insert(key.into(), function);
        self
    }

    pub fn contains(&self, reference: &RenderFunctionRef) -> bool {
        self.functions.contains_key(&reference.key())
    }

    /// Look up a function, failing for unregistered references
    pub fn get(&self, reference: &RenderFunctionRef) -> EngineResult<RenderFn> {
        let key = reference.key();
        self.functions
            .get(&key)
            .copied()
            .ok_or(EngineError::UnknownRenderFunction(key))
    }

    /// Fill the options of every field that names a render function
    pub fn process(&self, registry: &mut FieldRegistry, context: &Row) -> EngineResult<()> {
        for field in registry.iter_mut() {
            let Some(render) = field.render_options.as_ref() else {
                continue;
            };
            let Some(reference) = render.render_function.as_ref() else {
                continue;
            };
            let function = self.get(reference)?;
            let rows = function(context, &render.render_output.identifier);
            let options = build_options(&rows, &render.render_output);
            debug!(field = %field.id, function = %reference.key(), options = options.len(), "Computed field options");
            field.options = Some(options);
        }
        Ok(())
    }
}

/// Build `{value, identifier, text}` options from render rows.
///
/// Rows without the value column are skipped. The text is the `output`
/// column, or the `output` columns concatenated; without `output` it falls
/// back to `text`, then to the value itself.
pub fn build_options(rows: &[Row], output: &RenderOutput) -> FieldOptions {
    let mut options = FieldOptions::new();
    for row in rows {
        let Some(value) = row.get(&output.value) else {
            continue;
        };
        let text = match &output.output {
            Some(OutputSpec::Column(column)) => row.get(column).map(path::display).unwrap_or_default(),
            Some(OutputSpec::Columns(columns)) => columns
                .iter()
                .map(|column| {
                    if column.is_empty() {
                        " ".to_string()
                    } else {
                        row.get(column).map(path::display).unwrap_or_default()
                    }
                })
                .collect(),
            None => output
                .text
                .as_ref()
                .and_then(|column| row.get(column))
                .map(path::display)
                .unwrap_or_else(|| path::display(value)),
        };
        options.insert(
            path::display(value),
            FieldOption {
                value: value.clone(),
                identifier: row.get(&output.identifier).cloned().unwrap_or_else(|| value.clone()),
                text,
            },
        );
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataobjects_core::ObjectKind;
    use dataobjects_model::{FieldDescriptor, RenderOptions};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn teams(_context: &Row, _identifier: &str) -> Vec<Row> {
        vec![
            json!({"id": 1, "title": "Red", "city": "Bonn"}),
            json!({"id": 2, "title": "Blue", "city": ""}),
            json!({"title": "orphan"}),
        ]
        .into_iter()
        .filter_map(|v| v.as_object().cloned())
        .collect()
    }

    fn render_options(output: OutputSpec) -> RenderOptions {
        RenderOptions {
            render_function: Some(RenderFunctionRef::new("Teams", "all")),
            render_output: RenderOutput {
                output: Some(output),
                ..RenderOutput::default()
            },
        }
    }

    #[test]
    fn test_single_output_column() {
        let options = build_options(
            &teams(&Row::new(), "id"),
            &render_options(OutputSpec::Column("title".into())).render_output,
        );
        assert_eq!(options.len(), 2);
        assert_eq!(options["1"].text, "Red");
        assert_eq!(options["2"].identifier, json!(2));
    }

    #[test]
    fn test_concatenated_output_columns() {
        let output = OutputSpec::Columns(vec!["title".into(), "".into(), "city".into()]);
        let options = build_options(&teams(&Row::new(), "id"), &render_options(output).render_output);
        assert_eq!(options["1"].text, "Red Bonn");
        assert_eq!(options["2"].text, "Blue ");
    }

    #[test]
    fn test_process_fills_field_options() {
        let mut registry = FieldRegistry::for_kind("users", ObjectKind::List);
        let field = registry.get_or_insert("team_id");
        field.set_render_options(Some(render_options(OutputSpec::Column("title".into()))));

        let mut renderers = RenderRegistry::new();
        renderers.register("Teams::all", teams);
        renderers.process(&mut registry, &Row::new()).unwrap();

        let field = registry.get("team_id").unwrap();
        assert_eq!(field.option("2").unwrap().text, "Blue");
    }

    #[test]
    fn test_unregistered_function_fails() {
        let mut registry = FieldRegistry::for_kind("users", ObjectKind::Form);
        let mut field = FieldDescriptor::form("team_id");
        field.set_render_options(Some(render_options(OutputSpec::Column("title".into()))));
        registry.set("team_id", field);

        let err = RenderRegistry::new().process(&mut registry, &Row::new()).unwrap_err();
        assert!(err.is_resolution());
        assert_eq!(err.to_string(), "Render function 'Teams::all' is not registered");
    }
}
