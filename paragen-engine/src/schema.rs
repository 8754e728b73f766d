//! The category/template/parameter schema that bounds what the FSM may
//! generate. Loaded once from a JSON description; strings are interned into
//! small integer ids so every hot-path table in [`crate::fsm`] is keyed by
//! integers rather than owned strings.

use serde::Deserialize;
use std::collections::HashMap;

use crate::error::{EngineError, Result};

/// Interned id of a category name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CategoryId(pub u32);

/// Interned id of a template name, unique within its owning category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplateId(pub u32);

/// Interned id of a parameter name, unique within its owning `(category, template)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(pub u32);

#[derive(Debug, Deserialize)]
struct SchemaFile {
    categories: Vec<CategorySpecFile>,
}

#[derive(Debug, Deserialize)]
struct CategorySpecFile {
    name: String,
    templates: Vec<TemplateSpecFile>,
}

#[derive(Debug, Deserialize)]
struct TemplateSpecFile {
    name: String,
    parameters: Vec<ParamSpecFile>,
}

#[derive(Debug, Deserialize)]
struct ParamSpecFile {
    name: String,
    dims: u32,
}

#[derive(Debug, Clone)]
struct TemplateEntry {
    name: String,
    params: Vec<ParamEntry>,
}

#[derive(Debug, Clone)]
struct ParamEntry {
    name: String,
    dims: u32,
}

#[derive(Debug, Clone)]
struct CategoryEntry {
    name: String,
    templates: Vec<TemplateEntry>,
}

/// The nested category/template/parameter mapping, with strings interned to
/// integer ids at load time.
#[derive(Debug, Clone)]
pub struct Schema {
    categories: Vec<CategoryEntry>,
    category_by_name: HashMap<String, CategoryId>,
    template_by_name: HashMap<(CategoryId, String), TemplateId>,
    param_by_name: HashMap<(CategoryId, TemplateId, String), ParamId>,
}

impl Schema {
    /// Parse a schema from its JSON description:
    /// `{ categories: [ { name, templates: [ { name, parameters: [ { name, dims } ] } ] } ] }`.
    ///
    /// When a name appears with more than one arity across the source corpus
    /// the caller is expected to have already reduced it to the largest
    /// (per SPEC_FULL.md §9(ii)); the schema file itself carries one `dims`
    /// per parameter name.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let file: SchemaFile = serde_json::from_str(s)
            .map_err(|e| EngineError::InvalidSchema(Box::new(e)))?;
        Self::from_file(file)
    }

    fn from_file(file: SchemaFile) -> Result<Self> {
        if file.categories.is_empty() {
            return Err(EngineError::InvalidSchema(
                "schema must declare at least one category".into(),
            ));
        }

        let mut categories = Vec::with_capacity(file.categories.len());
        let mut category_by_name = HashMap::new();
        let mut template_by_name = HashMap::new();
        let mut param_by_name = HashMap::new();

        for (cidx, cat) in file.categories.into_iter().enumerate() {
            let category_id = CategoryId(cidx as u32);
            if category_by_name
                .insert(cat.name.clone(), category_id)
                .is_some()
            {
                return Err(EngineError::InvalidSchema(
                    format!("duplicate category name {:?}", cat.name).into(),
                ));
            }

            let mut templates = Vec::with_capacity(cat.templates.len());
            for (tidx, tpl) in cat.templates.into_iter().enumerate() {
                let template_id = TemplateId(tidx as u32);
                if template_by_name
                    .insert((category_id, tpl.name.clone()), template_id)
                    .is_some()
                {
                    return Err(EngineError::InvalidSchema(
                        format!(
                            "duplicate template name {:?} in category {:?}",
                            tpl.name, cat.name
                        )
                        .into(),
                    ));
                }

                let mut params = Vec::with_capacity(tpl.parameters.len());
                for (pidx, p) in tpl.parameters.into_iter().enumerate() {
                    if p.dims == 0 {
                        return Err(EngineError::InvalidSchema(
                            format!("parameter {:?} declares zero dims", p.name).into(),
                        ));
                    }
                    let param_id = ParamId(pidx as u32);
                    if param_by_name
                        .insert((category_id, template_id, p.name.clone()), param_id)
                        .is_some()
                    {
                        return Err(EngineError::InvalidSchema(
                            format!("duplicate parameter name {:?} in template {:?}", p.name, tpl.name)
                                .into(),
                        ));
                    }
                    params.push(ParamEntry {
                        name: p.name,
                        dims: p.dims,
                    });
                }

                templates.push(TemplateEntry {
                    name: tpl.name,
                    params,
                });
            }

            categories.push(CategoryEntry {
                name: cat.name,
                templates,
            });
        }

        Ok(Self {
            categories,
            category_by_name,
            template_by_name,
            param_by_name,
        })
    }

    pub fn category_ids(&self) -> impl Iterator<Item = CategoryId> + '_ {
        (0..self.categories.len() as u32).map(CategoryId)
    }

    pub fn category_name(&self, id: CategoryId) -> &str {
        &self.categories[id.0 as usize].name
    }

    pub fn category_id(&self, name: &str) -> Option<CategoryId> {
        self.category_by_name.get(name).copied()
    }

    pub fn template_ids(&self, category: CategoryId) -> impl Iterator<Item = TemplateId> + '_ {
        (0..self.categories[category.0 as usize].templates.len() as u32).map(TemplateId)
    }

    pub fn template_name(&self, category: CategoryId, template: TemplateId) -> &str {
        &self.categories[category.0 as usize].templates[template.0 as usize].name
    }

    pub fn template_id(&self, category: CategoryId, name: &str) -> Option<TemplateId> {
        self.template_by_name.get(&(category, name.to_string())).copied()
    }

    pub fn param_ids(
        &self,
        category: CategoryId,
        template: TemplateId,
    ) -> impl Iterator<Item = ParamId> + '_ {
        (0..self.categories[category.0 as usize].templates[template.0 as usize]
            .params
            .len() as u32)
            .map(ParamId)
    }

    pub fn param_name(&self, category: CategoryId, template: TemplateId, param: ParamId) -> &str {
        &self.categories[category.0 as usize].templates[template.0 as usize].params[param.0 as usize]
            .name
    }

    pub fn param_id(&self, category: CategoryId, template: TemplateId, name: &str) -> Option<ParamId> {
        self.param_by_name
            .get(&(category, template, name.to_string()))
            .copied()
    }

    /// Expected arity (array length) for `(category, template, param)`.
    pub fn param_dims(&self, category: CategoryId, template: TemplateId, param: ParamId) -> u32 {
        self.categories[category.0 as usize].templates[template.0 as usize].params[param.0 as usize]
            .dims
    }

    pub fn param_count(&self, category: CategoryId, template: TemplateId) -> usize {
        self.categories[category.0 as usize].templates[template.0 as usize]
            .params
            .len()
    }
}
