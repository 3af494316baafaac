use partsdb_core::db::open_db_in_memory;
use partsdb_core::{
    NewPart, PartRef, PartRepository, SqlitePartRepository, TaxonomyError, TaxonomyService,
};
use uuid::Uuid;

fn setup() -> rusqlite::Connection {
    open_db_in_memory().unwrap()
}

fn service(conn: &rusqlite::Connection) -> TaxonomyService<SqlitePartRepository<'_>> {
    TaxonomyService::new(SqlitePartRepository::try_new(conn).unwrap())
}

#[test]
fn create_part_trims_name_and_rejects_blank() {
    let conn = setup();
    let service = service(&conn);

    let part = service.create_part(NewPart::named("  CPU  ")).unwrap();
    assert_eq!(part.name, "CPU");
    assert_eq!(part.parent_uuid, None);
    assert!(!part.is_standard);
    assert!(!part.is_connector);

    let err = service.create_part(NewPart::named("   ")).unwrap_err();
    assert!(matches!(err, TaxonomyError::InvalidName));
}

#[test]
fn children_are_listed_in_name_order() {
    let conn = setup();
    let service = service(&conn);

    let cpu = service.create_part(NewPart::named("CPU")).unwrap();
    for name in ["Pentium 4", "Athlon XP", "Core 2 Duo"] {
        service
            .create_part(NewPart {
                name: name.to_string(),
                parent: Some(PartRef::Id(cpu.uuid)),
                ..NewPart::default()
            })
            .unwrap();
    }

    let children = service.children_of(cpu.uuid).unwrap();
    let names: Vec<_> = children.iter().map(|part| part.name.as_str()).collect();
    assert_eq!(names, ["Athlon XP", "Core 2 Duo", "Pentium 4"]);
}

#[test]
fn parent_can_be_referenced_by_name() {
    let conn = setup();
    let service = service(&conn);

    let cpu = service.create_part(NewPart::named("CPU")).unwrap();
    let pentium = service
        .create_part(NewPart {
            name: "Pentium 4".to_string(),
            parent: Some(PartRef::from("CPU")),
            ..NewPart::default()
        })
        .unwrap();

    assert_eq!(pentium.parent_uuid, Some(cpu.uuid));
}

#[test]
fn find_part_by_name_reports_missing_and_ambiguous_names() {
    let conn = setup();
    let service = service(&conn);

    let err = service.find_part_by_name("CPU").unwrap_err();
    assert!(matches!(err, TaxonomyError::NameNotFound(name) if name == "CPU"));

    let cpu = service.create_part(NewPart::named("CPU")).unwrap();
    let found = service.find_part_by_name("CPU").unwrap();
    assert_eq!(found.uuid, cpu.uuid);

    let ram = service.create_part(NewPart::named("RAM")).unwrap();
    service
        .create_part(NewPart {
            name: "Size".to_string(),
            parent: Some(PartRef::Id(cpu.uuid)),
            ..NewPart::default()
        })
        .unwrap();
    service
        .create_part(NewPart {
            name: "Size".to_string(),
            parent: Some(PartRef::Id(ram.uuid)),
            ..NewPart::default()
        })
        .unwrap();

    let err = service.find_part_by_name("Size").unwrap_err();
    assert!(matches!(
        err,
        TaxonomyError::AmbiguousName { name, matches } if name == "Size" && matches == 2
    ));

    let all = service.find_parts_by_name("Size").unwrap();
    assert_eq!(all.len(), 2);
}

#[test]
fn resolve_part_rejects_unknown_id() {
    let conn = setup();
    let service = service(&conn);
    let unknown = Uuid::new_v4();

    let err = service.resolve_part(unknown).unwrap_err();
    assert!(matches!(err, TaxonomyError::PartNotFound(id) if id == unknown));
}

#[test]
fn reparent_moves_part_and_back_to_top_level() {
    let conn = setup();
    let service = service(&conn);

    let cpu = service.create_part(NewPart::named("CPU")).unwrap();
    let pentium = service
        .create_part(NewPart {
            name: "Pentium 4".to_string(),
            parent: Some(PartRef::Id(cpu.uuid)),
            ..NewPart::default()
        })
        .unwrap();
    let intel = service.create_part(NewPart::named("Intel")).unwrap();

    let moved = service
        .reparent(pentium.uuid, Some(PartRef::Id(intel.uuid)))
        .unwrap();
    assert_eq!(moved.parent_uuid, Some(intel.uuid));
    assert!(service.children_of(cpu.uuid).unwrap().is_empty());

    let detached = service.reparent(pentium.uuid, None).unwrap();
    assert_eq!(detached.parent_uuid, None);

    let top_level = service.top_level_parts().unwrap();
    let names: Vec<_> = top_level.iter().map(|part| part.name.as_str()).collect();
    assert_eq!(names, ["CPU", "Intel", "Pentium 4"]);
}

#[test]
fn reparent_rejects_self_parenting() {
    let conn = setup();
    let service = service(&conn);

    let cpu = service.create_part(NewPart::named("CPU")).unwrap();
    let err = service
        .reparent(cpu.uuid, Some(PartRef::Id(cpu.uuid)))
        .unwrap_err();
    assert!(matches!(
        err,
        TaxonomyError::CycleDetected { part_uuid, parent_uuid }
            if part_uuid == cpu.uuid && parent_uuid == cpu.uuid
    ));
}

#[test]
fn reparent_rejects_descendant_cycle() {
    let conn = setup();
    let service = service(&conn);

    let grandparent = service.create_part(NewPart::named("Hardware")).unwrap();
    let parent = service
        .create_part(NewPart {
            name: "CPU".to_string(),
            parent: Some(PartRef::Id(grandparent.uuid)),
            ..NewPart::default()
        })
        .unwrap();
    let child = service
        .create_part(NewPart {
            name: "Pentium 4".to_string(),
            parent: Some(PartRef::Id(parent.uuid)),
            ..NewPart::default()
        })
        .unwrap();

    let err = service
        .reparent(grandparent.uuid, Some(PartRef::Id(child.uuid)))
        .unwrap_err();
    assert!(matches!(
        err,
        TaxonomyError::CycleDetected { part_uuid, parent_uuid }
            if part_uuid == grandparent.uuid && parent_uuid == child.uuid
    ));
}

#[test]
fn reparent_rejects_unknown_parent_name() {
    let conn = setup();
    let service = service(&conn);

    let cpu = service.create_part(NewPart::named("CPU")).unwrap();
    let err = service
        .reparent(cpu.uuid, Some(PartRef::from("Nonexistent")))
        .unwrap_err();
    assert!(matches!(err, TaxonomyError::NameNotFound(name) if name == "Nonexistent"));
}

#[test]
fn ancestors_walk_nearest_first() {
    let conn = setup();
    let service = service(&conn);

    let root = service.create_part(NewPart::named("Hardware")).unwrap();
    let mid = service
        .create_part(NewPart {
            name: "CPU".to_string(),
            parent: Some(PartRef::Id(root.uuid)),
            ..NewPart::default()
        })
        .unwrap();
    let leaf = service
        .create_part(NewPart {
            name: "Pentium 4".to_string(),
            parent: Some(PartRef::Id(mid.uuid)),
            ..NewPart::default()
        })
        .unwrap();

    let chain: Vec<_> = service
        .ancestors_of(leaf.uuid)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let names: Vec<_> = chain.iter().map(|part| part.name.as_str()).collect();
    assert_eq!(names, ["CPU", "Hardware"]);

    let empty: Vec<_> = service
        .ancestors_of(root.uuid)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert!(empty.is_empty());
}

#[test]
fn created_parts_are_readable_through_the_repository() {
    let conn = setup();
    let repo = SqlitePartRepository::try_new(&conn).unwrap();
    let service = TaxonomyService::new(SqlitePartRepository::try_new(&conn).unwrap());

    let part = service
        .create_part(NewPart {
            name: "Socket 478".to_string(),
            note: Some("desktop CPU socket".to_string()),
            parent: None,
            is_standard: false,
            is_connector: true,
        })
        .unwrap();

    let read_back = repo.get_part(part.uuid).unwrap().unwrap();
    assert_eq!(read_back, part);
    assert!(read_back.is_connector);
    assert_eq!(read_back.note.as_deref(), Some("desktop CPU socket"));
    assert!(read_back.created_at > 0);
}
