//! End-to-end resolution tests against the local filesystem.

use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strata_rs_config::{
    ConfigError, ConfigLoader, ConfigMerger, ConfigValue, CwdResolver, DEFAULT_SNAPSHOT_DIR,
    EFFECTIVE_SNAPSHOT_FILE, FileStorage, FixedTopology, Mapping, MemoryStorage, MergerOptions,
    OVERRIDE_SNAPSHOT_FILE, OverrideSpec,
};
use tempfile::TempDir;

const TOPOLOGY: FixedTopology = FixedTopology {
    physical: 4,
    logical: 8,
};

/// Chain of documents that include each other by absolute path.
struct Fixture {
    temp: TempDir,
    test1: PathBuf,
    test5: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().expect("tmp");
        let root = temp.path();
        let test1 = write(root, "test1.yml", "---\na: 1\nb: 2\nc:\n - 1\n - 2\n - 3\nd:\n  d1: 1\n  d2: 2\n");
        let test2 = write(
            root,
            "test2.yml",
            &format!("---\na: 2\ninclude:\n  - {}\nb: 3\n", test1.display()),
        );
        let test3 = write(
            root,
            "test3.yml",
            &format!("---\na: 3\ninclude:\n  - {}\n", test2.display()),
        );
        let test4 = write(root, "test4.yml", "---\nd:\n  d2: 3\n  d3: 3\n");
        let test5 = write(
            root,
            "test5.yml",
            &format!(
                "---\ninclude:\n  - {}\n  - {}\n",
                test3.display(),
                test4.display()
            ),
        );
        Self { temp, test1, test5 }
    }

    fn root(&self) -> &Path {
        self.temp.path()
    }

    fn loader(&self) -> ConfigLoader {
        ConfigLoader::new(Arc::new(FileStorage), Arc::new(CwdResolver::new(self.root())))
    }

    fn merger(&self) -> ConfigMerger {
        ConfigMerger::new(self.loader()).with_topology(Arc::new(TOPOLOGY))
    }

    fn output_dir(&self, name: &str) -> String {
        self.root().join(name).to_string_lossy().into_owned()
    }
}

fn write(root: &Path, name: &str, contents: &str) -> PathBuf {
    let path = root.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("dir");
    }
    fs::write(&path, contents).expect("write");
    path
}

fn yaml(contents: &str) -> Mapping {
    serde_yaml::from_str(contents).expect("yaml")
}

fn read_snapshot(output_dir: &str, name: &str) -> Mapping {
    let path = Path::new(output_dir).join(DEFAULT_SNAPSHOT_DIR).join(name);
    let contents = fs::read_to_string(&path).expect("snapshot");
    yaml(&contents)
}

fn test1_expected() -> Mapping {
    yaml("a: 1\nb: 2\nc: [1, 2, 3]\nd: {d1: 1, d2: 2}\n")
}

fn test5_expected() -> Mapping {
    yaml("a: 1\nb: 3\nc: [1, 2, 3]\nd: {d1: 1, d2: 3, d3: 3}\n")
}

#[test]
fn reads_plain_and_chained_documents() {
    let fixture = Fixture::new();
    let loader = fixture.loader();

    let conf = loader
        .load(&fixture.test1.to_string_lossy(), None)
        .expect("test1");
    assert_eq!(conf, test1_expected());

    let conf = loader
        .load(&fixture.test5.to_string_lossy(), None)
        .expect("test5");
    assert_eq!(conf, test5_expected());
}

#[test]
fn relative_top_level_path_uses_resolver_base() {
    let fixture = Fixture::new();
    let conf = fixture.loader().load("test5.yml", None).expect("test5");
    assert_eq!(conf, test5_expected());
}

#[test]
fn user_conf_is_persisted_in_both_snapshots() {
    let fixture = Fixture::new();
    for (source, expected) in [
        (&fixture.test1, test1_expected()),
        (&fixture.test5, test5_expected()),
    ] {
        let output_dir = fixture.output_dir("log");
        let spec = OverrideSpec::new().with_user_conf(source.to_string_lossy());
        let resolution = fixture
            .merger()
            .resolve(&Mapping::new(), &spec, &output_dir)
            .expect("resolve");

        assert_eq!(resolution.written.len(), 2);
        assert_eq!(read_snapshot(&output_dir, OVERRIDE_SNAPSHOT_FILE), expected);

        let mut effective = expected.clone();
        effective.insert("n_jobs", ConfigValue::from(4));
        assert_eq!(read_snapshot(&output_dir, EFFECTIVE_SNAPSHOT_FILE), effective);
        assert_eq!(resolution.config, effective);
    }
}

#[test]
fn explicit_overrides_win_over_user_conf() {
    let fixture = Fixture::new();
    let output_dir = fixture.output_dir("log2");
    let spec = OverrideSpec::from_assignments(["+b=9", "+d.d2=3", "+d.d3=4", "+e=5", "n_jobs=-2"])
        .expect("spec")
        .with_user_conf(fixture.test1.to_string_lossy());

    let resolution = fixture
        .merger()
        .resolve(&Mapping::new(), &spec, &output_dir)
        .expect("resolve");

    assert_eq!(read_snapshot(&output_dir, OVERRIDE_SNAPSHOT_FILE), test1_expected());
    assert_eq!(resolution.override_snapshot, Some(test1_expected()));

    let expected = yaml("a: 1\nb: 9\nc: [1, 2, 3]\nd: {d1: 1, d2: 3, d3: 4}\ne: 5\nn_jobs: 7\n");
    assert_eq!(read_snapshot(&output_dir, EFFECTIVE_SNAPSHOT_FILE), expected);
    assert_eq!(resolution.config, expected);
}

#[test]
fn override_material_beats_base_at_every_depth() {
    let fixture = Fixture::new();
    let user = write(fixture.root(), "user.yml", "d: {d2: user}\nc: [9]\nn_jobs: 2\n");
    let base = fixture
        .loader()
        .load(&fixture.test5.to_string_lossy(), None)
        .expect("base");
    let spec = OverrideSpec::new().with_user_conf(user.to_string_lossy());

    let resolution = fixture
        .merger()
        .resolve(&base, &spec, &fixture.output_dir("out"))
        .expect("resolve");

    assert_eq!(
        resolution.config,
        yaml("a: 1\nb: 3\nc: [9]\nd: {d1: 1, d2: user, d3: 3}\nn_jobs: 2\n")
    );
}

#[test]
fn explicit_overrides_alone_write_only_effective_snapshot() {
    let fixture = Fixture::new();
    let output_dir = fixture.output_dir("only");
    let spec = OverrideSpec::from_assignments(["a=10"]).expect("spec");

    let resolution = fixture
        .merger()
        .resolve(&test1_expected(), &spec, &output_dir)
        .expect("resolve");

    assert_eq!(resolution.override_snapshot, None);
    assert_eq!(resolution.written.len(), 1);
    assert!(
        !Path::new(&output_dir)
            .join(DEFAULT_SNAPSHOT_DIR)
            .join(OVERRIDE_SNAPSHOT_FILE)
            .exists()
    );
    assert_eq!(resolution.config.get("a"), Some(&ConfigValue::from(10)));
}

#[test]
fn empty_spec_writes_nothing_and_returns_base() {
    let storage = Arc::new(MemoryStorage::new());
    let loader = ConfigLoader::new(storage.clone(), Arc::new(CwdResolver::new("/conf")));
    let merger = ConfigMerger::new(loader)
        .with_topology(Arc::new(TOPOLOGY))
        .with_options(MergerOptions::default().without_jobs_normalization());
    let base = test1_expected();

    let resolution = merger
        .resolve(&base, &OverrideSpec::new(), "/out")
        .expect("resolve");

    assert_eq!(resolution.config, base);
    assert!(resolution.written.is_empty());
    assert!(storage.writes().is_empty());
}

#[test]
fn empty_spec_still_normalizes_worker_count() {
    let fixture = Fixture::new();
    let mut base = test1_expected();
    base.insert("n_jobs", ConfigValue::from(-1));

    let resolution = fixture
        .merger()
        .resolve(&base, &OverrideSpec::new(), &fixture.output_dir("none"))
        .expect("resolve");

    assert_eq!(resolution.config.get("n_jobs"), Some(&ConfigValue::from(8)));
    assert!(!Path::new(&fixture.output_dir("none")).exists());
}

#[test]
fn snapshots_go_through_the_loader_storage() {
    let storage = Arc::new(
        MemoryStorage::new()
            .with_file("/conf/user.yaml", "include: [base.yaml]\nx: 1\n")
            .with_file("/conf/base.yaml", "y: 2\n"),
    );
    let loader = ConfigLoader::new(storage.clone(), Arc::new(CwdResolver::new("/conf")));
    let merger = ConfigMerger::new(loader)
        .with_topology(Arc::new(TOPOLOGY))
        .with_options(MergerOptions::default().with_snapshot_dir("audit"));
    let spec = OverrideSpec::new().with_user_conf("user.yaml");

    let resolution = merger
        .resolve(&Mapping::new(), &spec, "s3://bucket/run/")
        .expect("resolve");

    assert_eq!(
        storage.writes(),
        vec![
            "s3://bucket/run/audit/override_orig.yaml".to_string(),
            "s3://bucket/run/audit/effective.yaml".to_string(),
        ]
    );
    let original = storage
        .contents("s3://bucket/run/audit/override_orig.yaml")
        .expect("snapshot");
    assert_eq!(String::from_utf8(original).expect("utf8"), "y: 2\nx: 1\n");
    assert_eq!(resolution.written, storage.writes());
}

#[test]
fn missing_user_conf_is_not_found() {
    let fixture = Fixture::new();
    let output_dir = fixture.output_dir("missing");
    let spec = OverrideSpec::new().with_user_conf("nope.yml");

    let err = fixture
        .merger()
        .resolve(&Mapping::new(), &spec, &output_dir)
        .unwrap_err();

    assert!(matches!(err, ConfigError::NotFound { .. }));
    assert!(!Path::new(&output_dir).exists());
}

#[test]
fn load_normalized_applies_worker_count() {
    let fixture = Fixture::new();
    let conf = fixture
        .merger()
        .load_normalized(&fixture.test1.to_string_lossy())
        .expect("conf");
    assert_eq!(conf.get("n_jobs"), Some(&ConfigValue::from(4)));
}

#[test]
fn json_and_json5_documents_can_be_included() {
    let fixture = Fixture::new();
    write(fixture.root(), "extra.json", r#"{"j": [1, 2], "d": {"d1": "json"}}"#);
    write(fixture.root(), "extra.json5", "{ k: 'five', // trailing comment\n }");
    let main = write(
        fixture.root(),
        "main.yaml",
        "include: [test1.yml, extra.json, extra.json5]\n",
    );

    let conf = fixture
        .loader()
        .load(&main.to_string_lossy(), None)
        .expect("conf");

    assert_eq!(
        conf,
        yaml("a: 1\nb: 2\nc: [1, 2, 3]\nd: {d1: json, d2: 2}\nj: [1, 2]\nk: five\n")
    );
}

#[cfg(unix)]
#[test]
fn include_through_symlinked_directory_is_a_cycle() {
    let fixture = Fixture::new();
    let root = fs::canonicalize(fixture.root()).expect("canonical");
    std::os::unix::fs::symlink(&root, root.join("link")).expect("symlink");
    let main = write(&root, "loop.yml", "a: 1\ninclude: [link/loop.yml]\n");

    let err = fixture
        .loader()
        .load(&main.to_string_lossy(), None)
        .unwrap_err();

    match err {
        ConfigError::Cycle { chain } => {
            let looped = main.to_string_lossy().into_owned();
            assert_eq!(chain, vec![looped.clone(), looped]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn empty_spec_with_default_options_adds_worker_count() {
    let fixture = Fixture::new();
    let base = yaml("a: 1\n");

    let resolution = fixture
        .merger()
        .resolve(&base, &OverrideSpec::new(), &fixture.output_dir("none"))
        .expect("resolve");

    assert_eq!(resolution.config, yaml("a: 1\nn_jobs: 4\n"));
    assert!(resolution.written.is_empty());
}
