use cellmaps_hierarchyeval::Runner;
use cellmaps_hierarchyeval::cache::CacheManager;
use cellmaps_hierarchyeval::config::{CacheConfig, Config};
use cellmaps_hierarchyeval::network::{AttributeValue, NetworkFormat, load_network};
use cellmaps_hierarchyeval::provenance::RoCrate;
use cellmaps_hierarchyeval::reference::{CACHE_CATEGORY, network_url};
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// 没有监听的地址，缓存未命中时立即失败
const OFFLINE_SERVER: &str = "http://127.0.0.1:9";

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// 构造一个 CX2 参考网络，每项为 (术语, 成员基因, 描述)
fn reference_network(name: &str, terms: &[(&str, &str, Option<&str>)]) -> Value {
    let nodes: Vec<Value> = terms
        .iter()
        .enumerate()
        .map(|(i, (term, genes, description))| {
            let mut values = json!({"n": term, "CD_MemberList": genes});
            if let Some(description) = description {
                values["description"] = json!(description);
            }
            json!({"id": i, "v": values})
        })
        .collect();
    json!([
        {"CXVersion": "2.0", "hasFragments": false},
        {"attributeDeclarations": [{
            "networkAttributes": {"name": {"d": "string"}},
            "nodes": {
                "name": {"d": "string", "a": "n"},
                "CD_MemberList": {"d": "string"},
                "description": {"d": "string"}
            }
        }]},
        {"networkAttributes": [{"name": name}]},
        {"nodes": nodes},
        {"status": [{"error": "", "success": true}]}
    ])
}

/// 预先填充参考网络缓存，避免测试访问网络
async fn populate_cache(config: &Config) {
    let cache = CacheManager::new(config.cache.clone());
    let server = &config.references.ndex_server;

    let corum = reference_network(
        "CORUM test",
        &[
            ("Complex alpha", "A B C D E", None),
            ("Complex beta", "H I J K", None),
        ],
    );
    let go_cc = reference_network(
        "GO-CC test",
        &[
            ("GO:0000001", "A B C D E F", Some("alpha")),
            ("GO:0000002", "G H I J K L X Y", Some("beta")),
            ("GO:0000003", "A B", Some("tiny")),
        ],
    );
    let hpa = reference_network(
        "HPA test",
        &[("Nucleoplasm", "A B C D E F", None), ("Cytosol", "G H I J", None)],
    );

    for (uuid, network) in [
        (&config.references.corum, corum),
        (&config.references.go_cc, go_cc),
        (&config.references.hpa, hpa),
    ] {
        cache
            .set(CACHE_CATEGORY, &network_url(server, uuid), &network)
            .await
            .unwrap();
    }
}

/// 与 4nodehierarchy.cx 内容相同的 CX2 层级
fn hierarchy_cx2() -> Value {
    let members = ["A B C D E F G H I J K L", "A B C D E F", "G H I J K L", "A B C"];
    let nodes: Vec<Value> = members
        .iter()
        .enumerate()
        .map(|(i, genes)| {
            json!({
                "id": i,
                "v": {"n": format!("C{}", i), "CD_MemberList": genes},
                "x": 0.0,
                "y": 0.0
            })
        })
        .collect();
    json!([
        {"CXVersion": "2.0", "hasFragments": false},
        {"metaData": [{"name": "nodes", "elementCount": 4}, {"name": "edges", "elementCount": 3}]},
        {"attributeDeclarations": [{
            "networkAttributes": {"name": {"d": "string"}},
            "nodes": {
                "name": {"d": "string", "a": "n"},
                "CD_MemberList": {"d": "string"}
            },
            "edges": {"interaction": {"d": "string", "v": "default"}}
        }]},
        {"networkAttributes": [{"name": "test 4node hierarchy cx2"}]},
        {"nodes": nodes},
        {"edges": [
            {"id": 4, "s": 0, "t": 1, "v": {}},
            {"id": 5, "s": 0, "t": 2, "v": {}},
            {"id": 6, "s": 1, "t": 3, "v": {}}
        ]},
        {"status": [{"error": "", "success": true}]}
    ])
}

/// 创建层级目录，并在其中放置指定格式的 4 节点层级、父网络与溯源信息
fn create_hierarchy_dir(root: &Path, format: NetworkFormat) -> PathBuf {
    let hierarchy_dir = root.join("4.hierarchy");
    fs::create_dir_all(&hierarchy_dir).unwrap();
    let parent = match format {
        NetworkFormat::Cx => {
            fs::copy(
                fixture("4nodehierarchy.cx"),
                hierarchy_dir.join("hierarchy.cx"),
            )
            .unwrap();
            json!([{"nodes": [{"@id": 0, "n": "A"}]}])
        }
        NetworkFormat::Cx2 => {
            fs::write(
                hierarchy_dir.join("hierarchy.cx2"),
                hierarchy_cx2().to_string(),
            )
            .unwrap();
            json!([
                {"CXVersion": "2.0", "hasFragments": false},
                {"nodes": [{"id": 0, "v": {"name": "A"}}]}
            ])
        }
    };
    fs::write(
        hierarchy_dir.join(format.file_name("hierarchy_parent")),
        parent.to_string(),
    )
    .unwrap();
    let ro_crate = json!({
        "@context": "https://w3id.org/ro/crate/1.1/context",
        "@graph": [{
            "@id": "./",
            "@type": "Dataset",
            "name": "hierarchy1",
            "organizationName": "hierarchy org",
            "projectName": "hierarchy project"
        }]
    });
    fs::write(
        hierarchy_dir.join("ro-crate-metadata.json"),
        ro_crate.to_string(),
    )
    .unwrap();
    hierarchy_dir
}

fn test_config(temp_dir: &TempDir) -> Config {
    test_config_for(temp_dir, NetworkFormat::Cx)
}

fn test_config_for(temp_dir: &TempDir, format: NetworkFormat) -> Config {
    let mut config = Config {
        outdir: temp_dir.path().join("outdir"),
        hierarchy_dir: create_hierarchy_dir(temp_dir.path(), format),
        cache: CacheConfig {
            enabled: true,
            cache_dir: temp_dir.path().join("cache"),
            expire_hours: 1,
        },
        command_line: "cellmaps_hierarchyevalcmd outdir --hierarchy_dir 4.hierarchy".to_string(),
        ..Default::default()
    };
    config.references.ndex_server = OFFLINE_SERVER.to_string();
    config.references.retry_attempts = 1;
    config.llm.ollama_prompts = vec!["FAKE".to_string()];
    config
}

#[tokio::test]
async fn test_4node_hierarchy() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    populate_cache(&config).await;

    let runner = Runner::new(config.clone());
    runner.run().await.unwrap();

    // 成功运行时 error.log 为空
    let error_log = config.outdir.join("error.log");
    assert_eq!(fs::metadata(&error_log).unwrap().len(), 0);
    assert!(config.outdir.join("output.log").exists());

    let hierarchy_file = runner.annotated_hierarchy_dest_file().unwrap();
    assert_eq!(hierarchy_file, config.outdir.join("hierarchy.cx"));
    let network = load_network(&hierarchy_file, NetworkFormat::Cx).unwrap();
    assert_eq!(network.name(), Some("test 4node hierarchy".to_string()));

    for node_id in network.node_ids() {
        for db_name in ["GO_CC", "HPA", "CORUM"] {
            for db_attr in ["_terms", "_descriptions", "_jaccard_indexes", "_overlap_genes"] {
                let attribute = format!("{}{}", db_name, db_attr);
                let value = network.node_attribute(node_id, &attribute);
                if db_name != "GO_CC" && db_attr == "_descriptions" {
                    assert!(value.is_none(), "{} should not be set", attribute);
                } else {
                    assert!(value.is_some(), "node {} is missing {}", node_id, attribute);
                }
            }
        }
        assert!(network.node_attribute(node_id, "FAKE_name").is_some());
        assert_eq!(
            network.node_attribute(node_id, "FAKE_confidence_score"),
            Some(AttributeValue::Double(0.5))
        );
    }

    assert_eq!(
        network.node_attribute(1, "GO_CC_terms"),
        Some(AttributeValue::ListOfString(vec!["GO:0000001".to_string()]))
    );
    assert_eq!(
        network.node_attribute(1, "GO_CC_jaccard_indexes"),
        Some(AttributeValue::ListOfDouble(vec![1.0]))
    );
    // 同一社区的成员列表保持不变
    assert_eq!(network.members(3), vec!["A", "B", "C"]);

    let edgelist = fs::read_to_string(config.outdir.join("hierarchy_edgelist.tsv")).unwrap();
    assert_eq!(edgelist, "parent\tchild\nC0\tC1\nC0\tC2\nC1\tC3\n");
    assert!(config.outdir.join("hierarchy_parent.cx").exists());

    let ro_crate = RoCrate::from_file(&config.outdir.join("ro-crate-metadata.json")).unwrap();
    let root = ro_crate.root().unwrap();
    assert_eq!(root.name.as_deref(), Some("hierarchy1"));
    assert_eq!(root.organization_name.as_deref(), Some("hierarchy org"));
    assert_eq!(root.project_name.as_deref(), Some("hierarchy project"));
    let computation = ro_crate
        .graph
        .iter()
        .find(|e| e.entity_type == "Computation")
        .unwrap();
    // 输入层级 + 三个参考网络
    assert_eq!(computation.used_dataset.len(), 4);
    // 注释层级、边列表与父网络
    assert_eq!(computation.generated.len(), 3);
}

#[tokio::test]
async fn test_4node_hierarchy_cx2() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config_for(&temp_dir, NetworkFormat::Cx2);
    populate_cache(&config).await;

    let runner = Runner::new(config.clone());
    runner.run().await.unwrap();

    assert_eq!(fs::metadata(config.outdir.join("error.log")).unwrap().len(), 0);

    let hierarchy_file = runner.annotated_hierarchy_dest_file().unwrap();
    assert_eq!(hierarchy_file, config.outdir.join("hierarchy.cx2"));
    assert!(!config.outdir.join("hierarchy.cx").exists());

    let network = load_network(&hierarchy_file, NetworkFormat::Cx2).unwrap();
    assert_eq!(network.format(), NetworkFormat::Cx2);
    assert_eq!(network.name(), Some("test 4node hierarchy cx2".to_string()));
    assert_eq!(network.node_name(2), Some("C2".to_string()));
    assert_eq!(network.members(3), vec!["A", "B", "C"]);

    for node_id in network.node_ids() {
        for attribute in ["CORUM_terms", "GO_CC_descriptions", "HPA_overlap_genes"] {
            assert!(
                network.node_attribute(node_id, attribute).is_some(),
                "node {} is missing {}",
                node_id,
                attribute
            );
        }
        assert!(network.node_attribute(node_id, "FAKE_name").is_some());
    }
    assert_eq!(
        network.node_attribute(1, "GO_CC_terms"),
        Some(AttributeValue::ListOfString(vec!["GO:0000001".to_string()]))
    );
    assert_eq!(
        network.node_attribute(1, "GO_CC_jaccard_indexes"),
        Some(AttributeValue::ListOfDouble(vec![1.0]))
    );

    // 新增属性写入了声明
    let raw: Vec<Value> =
        serde_json::from_str(&fs::read_to_string(&hierarchy_file).unwrap()).unwrap();
    let declarations = raw
        .iter()
        .find_map(|a| a.get("attributeDeclarations"))
        .unwrap();
    assert_eq!(declarations[0]["nodes"]["GO_CC_terms"]["d"], "list_of_string");
    // 节点值已写为完整属性名，别名不再保留
    assert!(declarations[0]["nodes"]["name"].get("a").is_none());
    let first_node = raw
        .iter()
        .find_map(|a| a.get("nodes"))
        .unwrap()[0]
        .clone();
    assert_eq!(first_node["v"]["name"], "C0");

    let edgelist = fs::read_to_string(config.outdir.join("hierarchy_edgelist.tsv")).unwrap();
    assert_eq!(edgelist, "parent\tchild\nC0\tC1\nC0\tC2\nC1\tC3\n");
    assert!(config.outdir.join("hierarchy_parent.cx2").exists());
    assert!(!config.outdir.join("hierarchy_parent.cx").exists());
}

#[tokio::test]
async fn test_rerun_into_existing_outdir() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(&temp_dir);
    config.llm.ollama_prompts.clear();
    populate_cache(&config).await;

    Runner::new(config.clone()).run().await.unwrap();
    Runner::new(config.clone()).run().await.unwrap();

    let network = load_network(&config.outdir.join("hierarchy.cx"), NetworkFormat::Cx).unwrap();
    assert!(network.node_attribute(0, "FAKE_name").is_none());
    assert_eq!(fs::metadata(config.outdir.join("error.log")).unwrap().len(), 0);
}

#[tokio::test]
async fn test_missing_reference_fails() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(&temp_dir);
    config.references.retry_delay_ms = 1;

    // 缓存为空且服务器不可达
    let err = Runner::new(config.clone()).run().await.unwrap_err();
    assert!(format!("{:#}", err).contains("Unable to fetch reference network"));

    let error_log = fs::read_to_string(config.outdir.join("error.log")).unwrap();
    assert!(error_log.contains("Unable to fetch reference network"));
    assert!(!config.outdir.join("hierarchy.cx").exists());
}
