//! End-to-end tests for the extraction pipeline
//!
//! Each test lays out source files in a temporary directory and runs agents over them,
//! checking what ends up in storage and in the compiled artifacts.

#[cfg(test)]
mod tests {
    use crate::*;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn write(root: &Path, file: &str, content: &str) {
        let path = root.join(file);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn agent(key: &str, include: &str, root: &Path, storage: Arc<dyn CatalogStorage>) -> Agent {
        Agent::new(
            key,
            "en",
            &strings(&["es"]),
            FileMatcher::new(&strings(&[include]), &[]).unwrap(),
            Arc::new(KeywordTransformer::new().unwrap()),
            storage,
        )
        .with_root(root)
    }

    fn translated(msgid: &str, msgstr: &str) -> CatalogItem {
        let mut item = CatalogItem::new(strings(&[msgid]), None, 1);
        item.msgstr = strings(&[msgstr]);
        item
    }

    const APP: &str = r#"
        title(_("Hello"));
        greet(_("Hi {0}", name));
        count(_n("One file", "{0} files", n));
    "#;

    #[tokio::test]
    async fn test_first_pass_writes_second_pass_is_idle() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/app.js", APP);
        let storage = MemoryStorage::new("app");
        let mut main = agent("main", "src/**/*.js", dir.path(), Arc::new(storage.clone()));
        let mut events = main.subscribe();
        let mut registry = Registry::new();
        let files = main.discover_files().unwrap();
        assert_eq!(files, vec!["src/app.js"]);

        let report = main
            .extract(&mut registry, &files, ExtractOptions::default())
            .await
            .unwrap();
        assert_eq!(report.files[0].indices, vec![0, 1, 2]);
        assert_eq!(report.written, vec!["en", "es"]);
        assert_eq!(report.updated_units, vec![None]);
        assert_eq!(storage.write_count(), 2);
        assert_eq!(
            events.try_recv().unwrap(),
            CatalogEvent {
                agent: "main".to_string(),
                load_id: None
            }
        );

        let en = storage.stored("en").unwrap();
        assert_eq!(en.get("Hello").unwrap().msgstr, vec!["Hello"]);
        assert_eq!(en.get("Hello").unwrap().references[0].file, "src/app.js");
        let es = storage.stored("es").unwrap();
        assert!(!es.get("Hello").unwrap().is_translated());
        assert_eq!(es.header("Language"), Some("es"));

        let again = main
            .extract(&mut registry, &files, ExtractOptions::default())
            .await
            .unwrap();
        assert!(again.written.is_empty());
        assert!(again.updated_units.is_empty());
        assert_eq!(again.files[0].indices, vec![0, 1, 2]);
        assert_eq!(storage.write_count(), 2);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_translations_are_compiled_and_rendered() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/app.js", APP);
        let mut es = Catalog::new();
        es.insert(translated("Hello", "Hola"));
        es.insert(translated("Hi {0}", "Hola"));
        let storage = MemoryStorage::new("app").with_catalog("es", es);
        let mut main = agent("main", "src/**/*.js", dir.path(), Arc::new(storage));
        let mut registry = Registry::new();
        main.extract(&mut registry, &strings(&["src/app.js"]), ExtractOptions::default())
            .await
            .unwrap();

        let runtime = Runtime::new("es", main.compiled("es").unwrap().clone()).unwrap();
        assert_eq!(runtime.text::<&str>(0, &[]), "Hola");
        // the stale translation lost its placeholder and falls back to the source text
        assert_eq!(runtime.text(1, &["Ana"]), "Hi Ana");
        assert_eq!(runtime.plural(2, 1, &["1"]), "One file");
        assert_eq!(runtime.text::<&str>(9, &[]), "i18n-404:9");

        let en = Runtime::new("en", main.compiled("en").unwrap().clone()).unwrap();
        assert_eq!(en.plural(2, 4, &["4"]), "4 files");
    }

    #[tokio::test]
    async fn test_clean_removes_stale_items() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/a.js", r#"_("Old") _("Keep")"#);
        write(dir.path(), "src/b.js", r#"_("Gone")"#);
        let storage = MemoryStorage::new("app");
        let mut main = agent("main", "src/**/*.js", dir.path(), Arc::new(storage.clone()));
        let mut registry = Registry::new();
        let files = strings(&["src/a.js", "src/b.js"]);
        main.extract(&mut registry, &files, ExtractOptions::default())
            .await
            .unwrap();

        write(dir.path(), "src/a.js", r#"_("Keep")"#);
        std::fs::remove_file(dir.path().join("src/b.js")).unwrap();
        let files = main.discover_files().unwrap();

        main.extract(&mut registry, &files, ExtractOptions::default())
            .await
            .unwrap();
        let en = storage.stored("en").unwrap();
        assert!(en.get("Old").unwrap().is_obsolete());
        assert!(!en.get("Gone").unwrap().is_obsolete());

        let clean = ExtractOptions {
            clean: true,
            ..Default::default()
        };
        let report = main.extract(&mut registry, &files, clean).await.unwrap();
        assert_eq!(report.removed_items, 4);
        let en = storage.stored("en").unwrap();
        assert_eq!(en.keys().collect::<Vec<_>>(), vec!["Keep"]);
        assert_eq!(en.stats().obsolete, 0);

        let writes = storage.write_count();
        let again = main.extract(&mut registry, &files, clean).await.unwrap();
        assert!(again.written.is_empty());
        assert_eq!(again.removed_items, 0);
        assert_eq!(storage.write_count(), writes);
        assert_eq!(storage.stored("en").unwrap(), en);
    }

    #[tokio::test]
    async fn test_agents_share_one_catalog() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/a.js", r#"_("Main")"#);
        write(dir.path(), "docs/b.js", r#"_("Docs")"#);
        let mut en = Catalog::new();
        for (msgid, file) in [
            ("Legacy", "legacy/x.js"),
            ("Removed", "src/old.js"),
            ("Draft", "docs/old.js"),
        ] {
            let mut item = translated(msgid, msgid);
            item.add_reference(file, vec![]);
            en.insert(item);
        }
        let storage = MemoryStorage::new("shared").with_catalog("en", en);

        let mut main = agent("main", "src/*.js", dir.path(), Arc::new(storage.clone()));
        let mut docs = agent("docs", "docs/*.js", dir.path(), Arc::new(storage.clone()));
        let mut registry = Registry::new();
        main.load(&mut registry).await.unwrap();
        docs.extract(&mut registry, &strings(&["docs/b.js"]), ExtractOptions::default())
            .await
            .unwrap();
        let state = registry.get(main.storage_key()).unwrap();
        assert_eq!(state.owner(), "main");
        assert_eq!(state.index().lookup("Docs"), Some(3));

        let clean = ExtractOptions {
            clean: true,
            ..Default::default()
        };
        // the owner strips its own stale files only
        let report = main
            .extract(&mut registry, &strings(&["src/a.js"]), clean)
            .await
            .unwrap();
        assert_eq!(report.removed_references, 1);
        assert_eq!(report.removed_items, 1);
        let stored = storage.stored("en").unwrap();
        assert_eq!(
            stored.keys().collect::<Vec<_>>(),
            vec!["Legacy", "Draft", "Docs", "Main"]
        );

        // a non-owner strips its own stale files and those of its siblings
        let report = docs
            .extract(&mut registry, &strings(&["docs/b.js"]), clean)
            .await
            .unwrap();
        assert_eq!(report.removed_references, 3);
        assert_eq!(report.removed_items, 3);
        let stored = storage.stored("en").unwrap();
        assert_eq!(stored.keys().collect::<Vec<_>>(), vec!["Legacy", "Docs"]);
        assert_eq!(
            docs.status(&registry).unwrap()[0].stats,
            CatalogStats {
                total: 2,
                untranslated: 0,
                obsolete: 0
            }
        );

        main.extract(&mut registry, &strings(&["src/a.js"]), ExtractOptions::default())
            .await
            .unwrap();
        let stored = storage.stored("en").unwrap();
        assert_eq!(stored.keys().collect::<Vec<_>>(), vec!["Legacy", "Docs", "Main"]);
        assert_eq!(
            registry.get(main.storage_key()).unwrap().index().lookup("Main"),
            Some(4)
        );
    }

    #[tokio::test]
    async fn test_rescanning_an_unchanged_file_writes_nothing() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/a.js", r#"_("Shared")"#);
        write(dir.path(), "src/b.js", r#"_("Shared")"#);
        let storage = MemoryStorage::new("app");
        let mut main = agent("main", "src/*.js", dir.path(), Arc::new(storage.clone()));
        let mut registry = Registry::new();
        main.extract(
            &mut registry,
            &strings(&["src/a.js", "src/b.js"]),
            ExtractOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(storage.write_count(), 2);

        let report = main.extract_file(&mut registry, "src/a.js").await.unwrap();
        assert!(report.written.is_empty());
        assert!(report.updated_units.is_empty());
        assert_eq!(storage.write_count(), 2);
        let en = storage.stored("en").unwrap();
        let files: Vec<&str> = en
            .get("Shared")
            .unwrap()
            .references
            .iter()
            .map(|r| r.file.as_str())
            .collect();
        assert_eq!(files, vec!["src/a.js", "src/b.js"]);
    }

    #[tokio::test]
    async fn test_failed_clean_pass_keeps_references() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/a.js", r#"_("One")"#);
        write(dir.path(), "src/b.js", r#"_("Two")"#);
        for mode in [ScanMode::Parallel, ScanMode::Sequential] {
            let storage = MemoryStorage::new("app");
            let mut main = agent("main", "src/*.js", dir.path(), Arc::new(storage.clone()));
            let mut registry = Registry::new();
            let files = strings(&["src/a.js", "src/b.js"]);
            main.extract(&mut registry, &files, ExtractOptions::default())
                .await
                .unwrap();
            let key = main.storage_key().to_string();
            let catalog = |registry: &Registry| {
                registry
                    .get(&key)
                    .and_then(|state| state.catalog("en"))
                    .cloned()
                    .unwrap()
            };
            let before = catalog(&registry);

            let result = main
                .extract(
                    &mut registry,
                    &strings(&["src/a.js", "src/missing.js"]),
                    ExtractOptions { clean: true, mode },
                )
                .await;
            assert!(matches!(result, Err(CatalogError::Io(_))));
            assert_eq!(catalog(&registry), before);

            let report = main.extract_file(&mut registry, "src/a.js").await.unwrap();
            assert!(report.written.is_empty());
            assert_eq!(storage.stored("en").unwrap(), before);
        }
    }

    #[tokio::test]
    async fn test_source_locale_conflict() {
        let dir = TempDir::new().unwrap();
        let storage = MemoryStorage::new("shared");
        let main = agent("main", "src/*.js", dir.path(), Arc::new(storage.clone()));
        let german = Agent::new(
            "de",
            "de",
            &[],
            FileMatcher::new(&strings(&["de/*.js"]), &[]).unwrap(),
            Arc::new(KeywordTransformer::new().unwrap()),
            Arc::new(storage),
        );
        let mut registry = Registry::new();
        main.load(&mut registry).await.unwrap();
        assert!(matches!(
            german.load(&mut registry).await,
            Err(CatalogError::SourceLocaleConflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_granular_units() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "pages/a.js", r#"_("A") _("Shared")"#);
        write(dir.path(), "pages/b.js", r#"_("Shared") _("B")"#);
        let storage = MemoryStorage::new("pages");
        let mut pages = agent("pages", "pages/*.js", dir.path(), Arc::new(storage))
            .with_granular(Arc::new(default_load_id));
        let mut events = pages.subscribe();
        let mut registry = Registry::new();
        let files = pages.discover_files().unwrap();
        let report = pages
            .extract(&mut registry, &files, ExtractOptions::default())
            .await
            .unwrap();

        assert_eq!(report.files[0].load_id.as_deref(), Some("pages_a_js"));
        assert_eq!(report.files[0].indices, vec![0, 1]);
        assert_eq!(report.files[1].load_id.as_deref(), Some("pages_b_js"));
        assert_eq!(report.files[1].indices, vec![0, 1]);
        assert!(pages.compiled("en").is_none());

        let unit = pages.granular().unwrap().by_id("pages_b_js").unwrap();
        assert_eq!(
            unit.compiled["en"].get(1),
            Some(&CompiledEntry::Single(CompiledElement::Text("B".to_string())))
        );
        // the shared state numbers every message once
        let state = registry.get(pages.storage_key()).unwrap();
        assert_eq!(state.index().lookup("B"), Some(2));

        assert_eq!(events.try_recv().unwrap().load_id.as_deref(), Some("pages_a_js"));
        assert_eq!(events.try_recv().unwrap().load_id.as_deref(), Some("pages_b_js"));

        write(dir.path(), "pages/b.js", r#"_("Shared") _("B") _("C")"#);
        let report = pages
            .extract_file(&mut registry, "pages/b.js")
            .await
            .unwrap();
        assert_eq!(report.updated_units, vec![Some("pages_b_js".to_string())]);
    }

    #[tokio::test]
    async fn test_po_storage_reload_keeps_indices() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/app.js", APP);
        let storage = Arc::new(PoStorage::new(dir.path().join("locales")));
        let files = strings(&["src/app.js"]);
        {
            let mut main = agent("main", "src/*.js", dir.path(), storage.clone());
            let mut registry = Registry::new();
            main.extract(&mut registry, &files, ExtractOptions::default())
                .await
                .unwrap();
        }
        assert!(dir.path().join("locales/en.po").exists());
        assert!(dir.path().join("locales/es.po").exists());

        write(dir.path(), "src/app.js", r#"_("New") _("Hi {0}")"#);
        let mut main = agent("main", "src/*.js", dir.path(), storage);
        let mut registry = Registry::new();
        let report = main
            .extract(&mut registry, &files, ExtractOptions::default())
            .await
            .unwrap();
        assert_eq!(report.files[0].indices, vec![3, 1]);
    }

    #[tokio::test]
    async fn test_unchanged_po_catalogs_are_not_rewritten() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/app.js", APP);
        let storage = Arc::new(PoStorage::new(dir.path().join("locales")));
        let files = strings(&["src/app.js"]);
        for _ in 0..2 {
            let mut main = agent("main", "src/*.js", dir.path(), storage.clone());
            main.extract(&mut Registry::new(), &files, ExtractOptions::default())
                .await
                .unwrap();
        }
        let mut main = agent("main", "src/*.js", dir.path(), storage);
        let report = main
            .extract(&mut Registry::new(), &files, ExtractOptions::default())
            .await
            .unwrap();
        assert!(report.written.is_empty());
    }

    #[tokio::test]
    async fn test_sequential_and_parallel_agree() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/a.js", r#"_("One") _("Two")"#);
        write(dir.path(), "src/b.js", r#"_("Two") _("Three")"#);
        let files = strings(&["src/a.js", "src/b.js"]);

        let mut stored = Vec::new();
        for mode in [ScanMode::Parallel, ScanMode::Sequential] {
            let storage = MemoryStorage::new("app");
            let mut main = agent("main", "src/*.js", dir.path(), Arc::new(storage.clone()));
            let options = ExtractOptions { clean: false, mode };
            main.extract(&mut Registry::new(), &files, options)
                .await
                .unwrap();
            stored.push(storage.stored("en").unwrap());
        }
        assert_eq!(stored[0], stored[1]);
        assert_eq!(
            stored[0].keys().collect::<Vec<_>>(),
            vec!["One", "Two", "Three"]
        );
    }

    #[tokio::test]
    async fn test_unreadable_file_aborts_before_saving() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/a.js", r#"_("One")"#);
        let storage = MemoryStorage::new("app");
        let mut main = agent("main", "src/*.js", dir.path(), Arc::new(storage.clone()));
        let result = main
            .extract(
                &mut Registry::new(),
                &strings(&["src/a.js", "src/missing.js"]),
                ExtractOptions::default(),
            )
            .await;
        assert!(matches!(result, Err(CatalogError::Io(_))));
        assert_eq!(storage.write_count(), 0);
    }

    #[tokio::test]
    async fn test_url_patterns() {
        let dir = TempDir::new().unwrap();
        let mut es = Catalog::new();
        es.insert(translated("/about", "/acerca"));
        let storage = MemoryStorage::new("app").with_catalog("es", es);
        let mut main = agent("main", "src/*.js", dir.path(), Arc::new(storage.clone()));
        let mut registry = Registry::new();

        let manifest = main
            .sync_url_patterns(&mut registry, &strings(&["/", "/about"]))
            .await
            .unwrap();
        assert_eq!(
            manifest,
            vec![
                UrlManifestItem::new("/", None),
                UrlManifestItem::new("/about", Some(strings(&["/about", "/acerca"])))
            ]
        );
        let localizer = UrlLocalizer::new(&manifest, main.locales()).unwrap();
        let matched = localizer.match_path("/acerca", Some("es")).unwrap();
        assert_eq!(matched.canonical_path, "/about");
        assert_eq!(matched.alternate_path("en").as_deref(), Some("/about"));

        let en = storage.stored("en").unwrap();
        assert_eq!(en.get("/about").unwrap().url_adapters, vec!["main"]);

        main.sync_url_patterns(&mut registry, &strings(&["/"]))
            .await
            .unwrap();
        let en = storage.stored("en").unwrap();
        assert!(en.get("/about").unwrap().is_obsolete());
    }
}
