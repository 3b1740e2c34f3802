//! Shared fixtures: a temp workspace carrying real discovery files, one
//! provider catalog rooted in it, and director trees over a static scope
//! model.
#![allow(dead_code)]

use std::sync::Arc;

use relay_extension::{
    ExtensionDirector, ExtensionScope, ProviderCatalog, ScopeModel, StaticScopeModel,
};
use tempfile::TempDir;

pub struct TestSpace {
    pub dir: TempDir,
    pub catalog: Arc<ProviderCatalog>,
    pub model: Arc<StaticScopeModel>,
}

impl TestSpace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp workspace");
        let catalog = Arc::new(ProviderCatalog::new("test"));
        catalog.add_root(dir.path());
        let model = Arc::new(StaticScopeModel::new("test-model"));
        model.add_catalog(catalog.clone());
        Self {
            dir,
            catalog,
            model,
        }
    }

    /// Write a discovery file under the user root (`META-INF/relay/`).
    pub fn write_spi(&self, point: &str, lines: &str) {
        self.write_spi_under("META-INF/relay/", point, lines);
    }

    /// Write a discovery file under an arbitrary directory prefix.
    pub fn write_spi_under(&self, prefix: &str, point: &str, lines: &str) {
        let dir = self.dir.path().join(prefix);
        std::fs::create_dir_all(&dir).expect("create discovery directory");
        std::fs::write(dir.join(point), lines).expect("write discovery file");
    }

    pub fn scope_model(&self) -> Arc<dyn ScopeModel> {
        self.model.clone() as Arc<dyn ScopeModel>
    }

    /// A lone framework-scope director.
    pub fn framework_director(&self) -> Arc<ExtensionDirector> {
        ExtensionDirector::new(None, ExtensionScope::Framework, self.scope_model())
    }

    /// A framework → application → module director chain over one model.
    pub fn director_tree(
        &self,
    ) -> (
        Arc<ExtensionDirector>,
        Arc<ExtensionDirector>,
        Arc<ExtensionDirector>,
    ) {
        let framework = self.framework_director();
        let application = ExtensionDirector::new(
            Some(framework.clone()),
            ExtensionScope::Application,
            self.scope_model(),
        );
        let module = ExtensionDirector::new(
            Some(application.clone()),
            ExtensionScope::Module,
            self.scope_model(),
        );
        (framework, application, module)
    }
}
