mod common;

use std::sync::Arc;

use common::{builder, module_path, write_config, ConsoleLogger, Journal, Recorder};
use parking_lot::Mutex;
use pim::plugins::{PluginFactory, StaticModuleLoader, PLUGIN_CREATOR_SYMBOL};
use pim::{Dependency, DependencyError, Extension, PluginError};
use tempfile::tempdir;

/// A provides one Logger, B depends on Logger with the given bounds
fn logger_pair(
    loader: &StaticModuleLoader,
    journal: &Journal,
    dependency: Dependency,
) -> (Arc<dyn Extension>, Arc<Mutex<Vec<pim::ExtensionHandle>>>) {
    let logger: Arc<dyn Extension> = Arc::new(ConsoleLogger);
    let connections = Arc::new(Mutex::new(Vec::new()));

    let provided = Arc::clone(&logger);
    let a_journal = journal.clone();
    loader.register(module_path("liba.so"), move || {
        Box::new(Recorder::new("a", &a_journal).providing(Arc::clone(&provided)))
    });

    let sink = Arc::clone(&connections);
    let b_journal = journal.clone();
    loader.register(module_path("libb.so"), move || {
        Box::new(
            Recorder::new("b", &b_journal)
                .needing(dependency.clone())
                .sharing_connections(Arc::clone(&sink)),
        )
    });

    (logger, connections)
}

#[cfg(test)]
mod end_to_end_tests {
    use super::*;

    #[test]
    fn test_single_logger_is_connected_once() {
        let dir = tempdir().unwrap();
        let loader = Arc::new(StaticModuleLoader::new());
        let journal = Journal::default();
        let (logger, connections) =
            logger_pair(&loader, &journal, Dependency::exactly("Logger", 1));
        let config = write_config(dir.path(), "plugins.yaml", &[], &["liba.so", "libb.so"], &[]);

        let manager = builder(&loader).load([config]).unwrap();

        assert_eq!(manager.plugin_count(), 2);
        assert_eq!(journal.count("connect:b"), 1);
        assert_eq!(journal.count("connect:a"), 0);
        {
            let connected = connections.lock();
            assert_eq!(connected.len(), 1);
            assert!(connected[0].is(&logger));
            assert_eq!(connected[0].plugin_name(), module_path("liba.so").display().to_string());
        }
        assert!(manager.extensions("Logger")[0].is(&logger));

        connections.lock().clear();
        drop(manager);
        assert!(!loader.is_open(module_path("liba.so")));
        assert!(!loader.is_open(module_path("libb.so")));
    }

    #[test]
    fn test_not_enough_extensions_aborts_before_post_init() {
        let dir = tempdir().unwrap();
        let loader = Arc::new(StaticModuleLoader::new());
        let journal = Journal::default();
        logger_pair(&loader, &journal, Dependency::exactly("Logger", 2));
        let config = write_config(dir.path(), "plugins.yaml", &[], &["liba.so", "libb.so"], &[]);

        let err = builder(&loader).load([config]).unwrap_err();

        match err {
            PluginError::Dependency(DependencyError::NotEnough {
                interface,
                available,
                min,
            }) => {
                assert_eq!(interface.name(), "Logger");
                assert_eq!(available, 1);
                assert_eq!(min, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(journal.count("post:a"), 0);
        assert_eq!(journal.count("post:b"), 0);
        assert_eq!(journal.count("connect:b"), 0);

        // Everything opened by the failed attempt is closed again
        assert!(!loader.is_open(module_path("liba.so")));
        assert!(!loader.is_open(module_path("libb.so")));
    }

    #[test]
    fn test_too_many_extensions_is_rejected() {
        let dir = tempdir().unwrap();
        let loader = Arc::new(StaticModuleLoader::new());
        let journal = Journal::default();
        logger_pair(&loader, &journal, Dependency::optional("Logger"));
        let config = write_config(
            dir.path(),
            "plugins.yaml",
            &[],
            &["liba.so", "liba.so", "libb.so"],
            &[],
        );

        let err = builder(&loader).load([config]).unwrap_err();
        assert!(matches!(
            err,
            PluginError::Dependency(DependencyError::TooMany {
                available: 2,
                max: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_skipped_plugin_is_never_opened() {
        let dir = tempdir().unwrap();
        let loader = Arc::new(StaticModuleLoader::new());
        let journal = Journal::default();
        logger_pair(&loader, &journal, Dependency::exactly("Logger", 1));

        let second = journal.clone();
        loader.register(module_path("libc.so"), move || {
            Box::new(Recorder::new("c", &second).providing(Arc::new(ConsoleLogger)))
        });

        let config = write_config(
            dir.path(),
            "plugins.yaml",
            &[],
            &["liba.so", "libc.so", "libb.so"],
            &["libc.so"],
        );

        let manager = builder(&loader).load([config]).unwrap();

        assert_eq!(loader.open_count(module_path("libc.so")), 0);
        assert_eq!(journal.count("initialize:c"), 0);
        assert_eq!(manager.extensions("Logger").len(), 1);
        assert_eq!(manager.plugin_count(), 2);
    }

    #[test]
    fn test_phases_are_ordered_across_plugins() {
        let dir = tempdir().unwrap();
        let loader = Arc::new(StaticModuleLoader::new());
        let journal = Journal::default();
        logger_pair(&loader, &journal, Dependency::at_least("Logger", 1));

        let third = journal.clone();
        loader.register(module_path("libc.so"), move || {
            Box::new(Recorder::new("c", &third).needing(Dependency::at_least("Logger", 0)))
        });

        let config = write_config(
            dir.path(),
            "plugins.yaml",
            &[],
            &["libb.so", "libc.so", "liba.so"],
            &[],
        );
        let _manager = builder(&loader).load([config]).unwrap();

        let entries = journal.entries();
        let last_init = entries.iter().rposition(|e| e.starts_with("initialize:")).unwrap();
        let first_connect = entries.iter().position(|e| e.starts_with("connect:")).unwrap();
        let last_connect = entries.iter().rposition(|e| e.starts_with("connect:")).unwrap();
        let first_post = entries.iter().position(|e| e.starts_with("post:")).unwrap();

        assert!(last_init < first_connect);
        assert!(last_connect < first_post);
        assert_eq!(journal.count("connect:c"), 1);
        assert_eq!(
            entries.iter().filter(|e| e.starts_with("post:")).count(),
            3
        );
        // Initialization follows load order
        assert!(journal.position("initialize:b") < journal.position("initialize:a"));
    }

    #[test]
    fn test_self_including_config_is_read_once() {
        let dir = tempdir().unwrap();
        let loader = Arc::new(StaticModuleLoader::new());
        let journal = Journal::default();
        logger_pair(&loader, &journal, Dependency::exactly("Logger", 1));

        let path = dir.path().join("self.yaml");
        let config = write_config(
            dir.path(),
            "self.yaml",
            &[path.as_path()],
            &["liba.so", "libb.so"],
            &[],
        );

        let manager = builder(&loader).load([config]).unwrap();

        assert_eq!(loader.open_count(module_path("liba.so")), 1);
        assert_eq!(manager.plugin_count(), 2);
        assert_eq!(journal.count("connect:b"), 1);
    }

    #[test]
    fn test_included_configs_are_combined() {
        let dir = tempdir().unwrap();
        let loader = Arc::new(StaticModuleLoader::new());
        let journal = Journal::default();
        logger_pair(&loader, &journal, Dependency::exactly("Logger", 1));

        let base = write_config(dir.path(), "base.yaml", &[], &["liba.so"], &[]);
        let base = std::path::PathBuf::from(base);
        let top = write_config(dir.path(), "top.yaml", &[base.as_path()], &["libb.so"], &[]);

        let manager = builder(&loader).load([top]).unwrap();
        let names: Vec<_> = manager.plugins().into_iter().map(|p| p.path).collect();
        assert_eq!(names, vec![module_path("libb.so"), module_path("liba.so")]);
        assert_eq!(journal.count("connect:b"), 1);
    }

    #[test]
    fn test_external_handle_outlives_manager() {
        let dir = tempdir().unwrap();
        let loader = Arc::new(StaticModuleLoader::new());
        let journal = Journal::default();
        let (_, connections) = logger_pair(&loader, &journal, Dependency::exactly("Logger", 1));
        let config = write_config(dir.path(), "plugins.yaml", &[], &["liba.so", "libb.so"], &[]);

        let manager = builder(&loader).load([config]).unwrap();
        let held = manager.first_extension("Logger").unwrap();
        connections.lock().clear();

        drop(manager);
        assert!(loader.is_open(module_path("liba.so")));
        assert!(!loader.is_open(module_path("libb.so")));
        assert!(held.downcast_ref::<ConsoleLogger>().is_some());

        drop(held);
        assert!(!loader.is_open(module_path("liba.so")));
    }
}

#[cfg(test)]
mod failure_tests {
    use super::*;

    #[test]
    fn test_unknown_module_reports_file_name() {
        let dir = tempdir().unwrap();
        let loader = Arc::new(StaticModuleLoader::new());
        let config = write_config(dir.path(), "plugins.yaml", &[], &["libghost.so"], &[]);

        let err = builder(&loader).load([config]).unwrap_err();
        assert!(err.to_string().starts_with("Error loading libghost.so"));
        match err {
            PluginError::ModuleOpen { file, .. } => assert_eq!(file, "libghost.so"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_entry_point_closes_earlier_modules() {
        let dir = tempdir().unwrap();
        let loader = Arc::new(StaticModuleLoader::new());
        let journal = Journal::default();
        logger_pair(&loader, &journal, Dependency::exactly("Logger", 1));
        loader.register_without_entry_point(module_path("libbare.so"));
        let config = write_config(dir.path(), "plugins.yaml", &[], &["liba.so", "libbare.so"], &[]);

        let err = builder(&loader).load([config]).unwrap_err();
        assert!(matches!(err, PluginError::MissingEntryPoint { .. }));
        assert!(!loader.is_open(module_path("liba.so")));
        assert!(!loader.is_open(module_path("libbare.so")));
        assert_eq!(journal.count("initialize:a"), 0);
    }

    #[test]
    fn test_null_plugin_is_invalid() {
        let dir = tempdir().unwrap();
        let loader = Arc::new(StaticModuleLoader::new());
        let factory: PluginFactory = Arc::new(|| None);
        loader.register_factory(module_path("libnull.so"), PLUGIN_CREATOR_SYMBOL, factory);
        let config = write_config(dir.path(), "plugins.yaml", &[], &["libnull.so"], &[]);

        let err = builder(&loader).load([config]).unwrap_err();
        assert!(matches!(err, PluginError::InvalidPlugin { .. }));
        assert!(!loader.is_open(module_path("libnull.so")));
    }

    #[test]
    fn test_failing_initialize_stops_the_load() {
        let dir = tempdir().unwrap();
        let loader = Arc::new(StaticModuleLoader::new());
        let journal = Journal::default();
        let first = journal.clone();
        loader.register(module_path("libbroken.so"), move || {
            Box::new(Recorder::new("broken", &first).failing_initialize())
        });
        let second = journal.clone();
        loader.register(module_path("libfine.so"), move || {
            Box::new(Recorder::new("fine", &second))
        });
        let config = write_config(
            dir.path(),
            "plugins.yaml",
            &[],
            &["libbroken.so", "libfine.so"],
            &[],
        );

        let err = builder(&loader).load([config]).unwrap_err();
        match &err {
            PluginError::Lifecycle { plugin, .. } => {
                assert_eq!(plugin, &module_path("libbroken.so").display().to_string());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(format!("{:#}", anyhow::Error::from(err)).contains("refused to start"));
        assert_eq!(journal.count("initialize:fine"), 0);
        assert!(!loader.is_open(module_path("libfine.so")));
    }

    #[test]
    fn test_malformed_config_is_a_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "plugins: [unterminated\n").unwrap();
        let loader = Arc::new(StaticModuleLoader::new());

        let err = builder(&loader)
            .load([path.display().to_string()])
            .unwrap_err();
        assert!(matches!(err, PluginError::Config { .. }));
        assert!(loader.events().is_empty());
    }

    #[test]
    fn test_blank_config_name_is_rejected() {
        let loader = Arc::new(StaticModuleLoader::new());
        let err = builder(&loader).load([""]).unwrap_err();
        assert!(matches!(err, PluginError::InvalidArgument(_)));
    }
}

#[cfg(test)]
mod resolution_tests {
    use super::*;
    use pim::paths::{PathResolver, ResourceKind};

    #[test]
    fn test_bare_plugin_names_fall_back_to_application_dir() {
        let dir = tempdir().unwrap();
        let loader = Arc::new(StaticModuleLoader::new());
        let journal = Journal::default();
        let first = journal.clone();
        let expected = dir.path().join("plugins").join("libplain.so");
        loader.register(expected.clone(), move || Box::new(Recorder::new("plain", &first)));

        let config_path = dir.path().join("plain.yaml");
        std::fs::write(&config_path, "plugins:\n  - libplain.so\n").unwrap();

        let resolver = PathResolver::new()
            .with_env_var(ResourceKind::Plugin, "PIM_INTEGRATION_UNSET_PLUGIN_PATH")
            .with_application_dir(dir.path());
        let manager = builder(&loader)
            .with_path_resolver(resolver)
            .load([config_path.display().to_string()])
            .unwrap();

        let plugins = manager.plugins();
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].name, "libplain.so");
        assert_eq!(plugins[0].path, expected);
        assert_eq!(journal.count("post:plain"), 1);
    }
}

#[cfg(test)]
mod concurrency_tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    const THREADS: usize = 8;

    #[test]
    fn test_handles_shared_across_threads_keep_module_open() {
        let dir = tempdir().unwrap();
        let loader = Arc::new(StaticModuleLoader::new());
        let journal = Journal::default();
        logger_pair(&loader, &journal, Dependency::exactly("Logger", 1));
        let config = write_config(dir.path(), "plugins.yaml", &[], &["liba.so"], &[]);

        let manager = builder(&loader).load([config]).unwrap();
        let handle = manager.first_extension("Logger").unwrap();

        let holding = Arc::new(Barrier::new(THREADS + 1));
        let release = Arc::new(Barrier::new(THREADS + 1));
        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                let mine = handle.clone();
                let holding = Arc::clone(&holding);
                let release = Arc::clone(&release);
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        let extra = mine.clone();
                        assert!(extra.downcast_ref::<ConsoleLogger>().is_some());
                        drop(extra);
                    }
                    holding.wait();
                    release.wait();
                    drop(mine);
                })
            })
            .collect();

        // Every worker now holds exactly one clone
        holding.wait();
        assert_eq!(handle.use_count(), THREADS + 2);
        drop(manager);
        drop(handle);
        assert!(loader.is_open(module_path("liba.so")));

        release.wait();
        for worker in workers {
            worker.join().unwrap();
        }
        assert!(!loader.is_open(module_path("liba.so")));
    }
}
