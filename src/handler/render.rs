//! Template rendering collaborator

use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde_json::Value;

/// Renders a template file with a JSON context into a response body
pub trait Renderer {
    fn render(&self, template: &Path, context: &Value) -> Result<String, String>;
}

impl<F> Renderer for F
where
    F: Fn(&Path, &Value) -> Result<String, String>,
{
    fn render(&self, template: &Path, context: &Value) -> Result<String, String> {
        self(template, context)
    }
}

/// A renderer plus the root its template names resolve against
#[derive(Clone)]
pub struct TemplateEngine {
    renderer: Rc<dyn Renderer>,
    root: PathBuf,
}

impl TemplateEngine {
    pub fn new(renderer: impl Renderer + 'static, root: impl Into<PathBuf>) -> Self {
        Self {
            renderer: Rc::new(renderer),
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Render `template` under the root
    ///
    /// An object context without a `config` key gets `config` added.
    pub fn render(
        &self,
        template: &str,
        context: &Value,
        config: Option<&Value>,
    ) -> Result<String, String> {
        let path = self.root.join(template);
        match (context, config) {
            (Value::Object(fields), Some(config)) if !fields.contains_key("config") => {
                let mut fields = fields.clone();
                fields.insert("config".to_string(), config.clone());
                self.renderer.render(&path, &Value::Object(fields))
            }
            _ => self.renderer.render(&path, context),
        }
    }
}

impl fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateEngine")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}
