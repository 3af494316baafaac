use partsdb_core::db::open_db_in_memory;
use partsdb_core::service::import_service::{
    AttrTypeRecord, CategoryRecord, PartTreeRecord, SubpartsRecord, SystemRecord, UnitRecord,
};
use partsdb_core::{
    AttrValue, AttributeService, ImportError, ImportService, SqliteAttrRepository,
    SqlitePartRepository, SqliteSystemRepository, SystemError, SystemService, TaxonomyError,
    TaxonomyService,
};
use serde_json::json;

fn setup() -> rusqlite::Connection {
    open_db_in_memory().unwrap()
}

fn part_service(conn: &rusqlite::Connection) -> TaxonomyService<SqlitePartRepository<'_>> {
    TaxonomyService::new(SqlitePartRepository::try_new(conn).unwrap())
}

fn attr_service(conn: &rusqlite::Connection) -> AttributeService<SqliteAttrRepository<'_>> {
    AttributeService::new(SqliteAttrRepository::try_new(conn).unwrap())
}

fn system_service(conn: &rusqlite::Connection) -> SystemService<SqliteSystemRepository<'_>> {
    SystemService::new(SqliteSystemRepository::try_new(conn).unwrap())
}

/// Imports the shared unit/type/category base used by most tests here.
fn import_base(import: &ImportService<'_>) {
    let units: Vec<UnitRecord> = serde_json::from_value(json!([
        {"name": "MHz", "label": "Megahertz", "format": "{value} MHz"},
        {"name": "GB", "label": "Gigabyte", "format": "{value} GB"},
        {"name": "text", "label": "Plain text"}
    ]))
    .unwrap();
    assert_eq!(import.import_units(&units).unwrap(), 3);

    let attr_types: Vec<AttrTypeRecord> = serde_json::from_value(json!([
        {"name": "Frequency", "unit": "MHz"},
        {"name": "FSB Frequency", "unit": "MHz", "from_to": true},
        {"name": "Capacity", "unit": "GB"},
        {"name": "Memory Type", "unit": "text", "multi_value": true}
    ]))
    .unwrap();
    assert_eq!(import.import_attr_types(&attr_types).unwrap(), 4);

    let categories: Vec<CategoryRecord> = serde_json::from_value(json!([
        {"name": "Computer", "note": "complete machines"},
        {"name": "CPU", "attr_types": ["Frequency", "FSB Frequency"]},
        {"name": "RAM", "attr_types": ["Capacity", "Memory Type"]},
        {"name": "Connector"}
    ]))
    .unwrap();
    assert_eq!(import.import_parts(&categories).unwrap(), 4);
}

#[test]
fn full_pipeline_builds_a_queryable_catalog() {
    let conn = setup();
    let import = ImportService::new(&conn);
    import_base(&import);

    let standards: Vec<PartTreeRecord> = serde_json::from_value(json!([
        {"parent": "RAM", "name": "DDR3 SDRAM"}
    ]))
    .unwrap();
    assert_eq!(import.import_standards(&standards).unwrap(), 1);

    let connectors: Vec<PartTreeRecord> = serde_json::from_value(json!([
        {"parent": "Connector", "name": "240-pin DIMM"}
    ]))
    .unwrap();
    assert_eq!(import.import_connectors(&connectors).unwrap(), 1);

    let subparts: Vec<SubpartsRecord> = serde_json::from_value(json!([
        {"parent": "CPU", "children": [
            {"name": "Pentium 4 2.8GHz", "attrs": {
                "Frequency": 2800,
                "FSB Frequency": {"from": 533, "to": 800}
            }}
        ]},
        {"parent": "RAM", "children": [
            {"name": "4GB DDR3 Module",
             "attrs": {"Capacity": 4, "Memory Type": ["DDR3"]},
             "standards": ["DDR3 SDRAM (Standard)"]}
        ]},
        {"parent": "Computer", "children": [
            {"name": "Acer Aspire M1935"}
        ]}
    ]))
    .unwrap();
    assert_eq!(import.import_subparts(&subparts).unwrap(), 3);

    let systems: Vec<SystemRecord> = serde_json::from_value(json!([
        {"name": "Acer Aspire M1935", "contents": [
            {"name": "Pentium 4 2.8GHz"},
            {"name": "240-pin DIMM", "quantity": 2},
            {"name": "4GB DDR3 Module", "quantity": 2, "via": "240-pin DIMM"}
        ]}
    ]))
    .unwrap();
    assert_eq!(import.import_systems(&systems).unwrap(), 1);

    let parts = part_service(&conn);
    let attrs = attr_service(&conn);
    let systems = system_service(&conn);

    // Standards are stored under their suffixed name only.
    let standard = parts.find_part_by_name("DDR3 SDRAM (Standard)").unwrap();
    assert!(standard.is_standard);
    let err = parts.find_part_by_name("DDR3 SDRAM").unwrap_err();
    assert!(matches!(err, TaxonomyError::NameNotFound(_)));

    let dimm = parts.find_part_by_name("240-pin DIMM").unwrap();
    assert!(dimm.is_connector);

    let pentium = parts.find_part_by_name("Pentium 4 2.8GHz").unwrap();
    let records = attrs.attributes_of(pentium.uuid).unwrap();
    let rendered: Vec<_> = records
        .iter()
        .map(|record| record.rendered.as_str())
        .collect();
    assert_eq!(rendered, ["533..800 MHz", "2800 MHz"]);

    let module = parts.find_part_by_name("4GB DDR3 Module").unwrap();
    let records = attrs.attributes_of(module.uuid).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].rendered, "4 GB");
    assert_eq!(
        records[1].value,
        AttrValue::Multi(vec!["DDR3".to_string()])
    );

    let module_standards = systems.standards_of(module.uuid).unwrap();
    assert_eq!(module_standards.len(), 1);
    assert_eq!(module_standards[0].uuid, standard.uuid);

    let machine = systems.system_by_name("Acer Aspire M1935").unwrap();
    let tree = systems.tree_of(machine.uuid).unwrap();
    assert_eq!(tree.part.name, "Acer Aspire M1935");
    let top_names: Vec<_> = tree
        .children
        .iter()
        .map(|child| child.part.name.as_str())
        .collect();
    assert_eq!(top_names, ["240-pin DIMM", "Pentium 4 2.8GHz"]);

    let dimm_node = &tree.children[0];
    assert_eq!(dimm_node.quantity, 2);
    assert_eq!(dimm_node.children.len(), 1);
    assert_eq!(dimm_node.children[0].part.name, "4GB DDR3 Module");
    assert_eq!(dimm_node.children[0].quantity, 2);

    let roots = parts.system_root_parts().unwrap();
    let names: Vec<_> = roots.iter().map(|part| part.name.as_str()).collect();
    assert_eq!(names, ["Acer Aspire M1935"]);
}

#[test]
fn equal_imported_values_share_one_attr_row() {
    let conn = setup();
    let import = ImportService::new(&conn);
    import_base(&import);

    let subparts: Vec<SubpartsRecord> = serde_json::from_value(json!([
        {"parent": "CPU", "children": [
            {"name": "Pentium 4 2.8GHz", "attrs": {"Frequency": 2800}},
            {"name": "Celeron 2.8GHz", "attrs": {"Frequency": 2800}}
        ]}
    ]))
    .unwrap();
    import.import_subparts(&subparts).unwrap();

    let stored: i64 = conn
        .query_row("SELECT COUNT(*) FROM attrs;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(stored, 1);
}

#[test]
fn unknown_parent_rolls_back_the_whole_batch() {
    let conn = setup();
    let import = ImportService::new(&conn);
    import_base(&import);

    let subparts: Vec<SubpartsRecord> = serde_json::from_value(json!([
        {"parent": "CPU", "children": [{"name": "Athlon XP"}]},
        {"parent": "Mystery", "children": [{"name": "Ghost"}]}
    ]))
    .unwrap();

    let err = import.import_subparts(&subparts).unwrap_err();
    assert!(matches!(
        err,
        ImportError::Taxonomy(TaxonomyError::NameNotFound(name)) if name == "Mystery"
    ));

    // The first record of the failed batch must not survive.
    let parts = part_service(&conn);
    let err = parts.find_part_by_name("Athlon XP").unwrap_err();
    assert!(matches!(err, TaxonomyError::NameNotFound(_)));
}

#[test]
fn unknown_attr_type_fails_the_part_batch() {
    let conn = setup();
    let import = ImportService::new(&conn);
    import_base(&import);

    let subparts: Vec<SubpartsRecord> = serde_json::from_value(json!([
        {"parent": "CPU", "children": [
            {"name": "Pentium 4 2.8GHz", "attrs": {"Voltage": 1.5}}
        ]}
    ]))
    .unwrap();

    let err = import.import_subparts(&subparts).unwrap_err();
    assert!(matches!(err, ImportError::Attr(_)));

    let parts = part_service(&conn);
    assert!(parts.find_part_by_name("Pentium 4 2.8GHz").is_err());
}

#[test]
fn system_roots_must_already_exist() {
    let conn = setup();
    let import = ImportService::new(&conn);
    import_base(&import);

    let systems: Vec<SystemRecord> = serde_json::from_value(json!([
        {"name": "Ghost Machine", "contents": []}
    ]))
    .unwrap();

    let err = import.import_systems(&systems).unwrap_err();
    assert!(matches!(
        err,
        ImportError::Taxonomy(TaxonomyError::NameNotFound(name)) if name == "Ghost Machine"
    ));
}

#[test]
fn via_targets_must_be_placed_before_their_contents() {
    let conn = setup();
    let import = ImportService::new(&conn);
    import_base(&import);

    let connectors: Vec<PartTreeRecord> = serde_json::from_value(json!([
        {"parent": "Connector", "name": "240-pin DIMM"}
    ]))
    .unwrap();
    import.import_connectors(&connectors).unwrap();

    let subparts: Vec<SubpartsRecord> = serde_json::from_value(json!([
        {"parent": "RAM", "children": [{"name": "4GB DDR3 Module"}]},
        {"parent": "Computer", "children": [{"name": "Acer Aspire M1935"}]}
    ]))
    .unwrap();
    import.import_subparts(&subparts).unwrap();

    // The DIMM exists in the taxonomy but was never placed in the system.
    let systems: Vec<SystemRecord> = serde_json::from_value(json!([
        {"name": "Acer Aspire M1935", "contents": [
            {"name": "4GB DDR3 Module", "via": "240-pin DIMM"}
        ]}
    ]))
    .unwrap();

    let err = import.import_systems(&systems).unwrap_err();
    assert!(matches!(
        err,
        ImportError::System(SystemError::RootUnreachable { .. })
    ));

    // The failed batch leaves no half-created system behind.
    let systems_read = system_service(&conn);
    let err = systems_read.system_by_name("Acer Aspire M1935").unwrap_err();
    assert!(matches!(err, SystemError::SystemNameNotFound(_)));
}
