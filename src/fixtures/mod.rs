//! In-memory packages for tests
//!
//! Builds small but structurally complete packages without touching disk.

use crate::changes::{PackageObserver, PackageUpdate};
use crate::config::EngineConfig;
use crate::entries::{EntryRef, ExportEntry, ImportEntry, ObjectName};
use crate::package::Package;
use crate::properties::{NameRef, Property, PropertyCollection, PropertyValue};
use parking_lot::Mutex;
use std::sync::Arc;

/// Observer that keeps every batch it receives
#[derive(Default)]
pub struct RecordingObserver {
    batches: Mutex<Vec<Vec<PackageUpdate>>>,
}

impl RecordingObserver {
    /// Every batch received so far
    pub fn batches(&self) -> Vec<Vec<PackageUpdate>> {
        self.batches.lock().clone()
    }
}

impl PackageObserver for RecordingObserver {
    fn package_changed(&self, updates: &[PackageUpdate]) {
        self.batches.lock().push(updates.to_vec());
    }
}

/// Add an import; the class package is always `Core`
pub fn add_import(pkg: &mut Package, name: &str, class: &str, link: EntryRef) -> EntryRef {
    let core = pkg.find_or_add_name("Core");
    let class_name = pkg.find_or_add_name(class);
    let object_name = pkg.find_or_add_name(name);
    pkg.add_import(ImportEntry {
        class_package: ObjectName::new(core, 0),
        class_name: ObjectName::new(class_name, 0),
        link,
        object_name: ObjectName::new(object_name, 0),
    })
    .unwrap()
}

/// Add an export whose payload is the given property list
pub fn add_export(
    pkg: &mut Package,
    name: &str,
    number: i32,
    link: EntryRef,
    class: EntryRef,
    properties: Vec<Property>,
) -> EntryRef {
    let object_name = pkg.find_or_add_name(name);
    let data = PropertyCollection::new(properties).encode(pkg).unwrap();
    let mut export = ExportEntry::new(ObjectName::new(object_name, number), link, class);
    export.data = data;
    pkg.add_export(export).unwrap()
}

/// A level with two actors and a component:
///
/// ```text
/// #1 TheWorld
/// #2   PersistentLevel
/// #3     StaticMeshActor_0  -> Base #4, StaticMeshComponent #5
/// #4     StaticMeshActor_1  -> Base #3
/// #5       StaticMeshComponent_0 (under #3) -> Owner #3, StaticMesh #-9
/// #-1 Core, #-2 Engine, #-3 Core.Object, #-4..#-7 Engine classes,
/// #-8 EngineMeshes, #-9 EngineMeshes.Cube
/// ```
pub fn sample_package_with(config: Arc<EngineConfig>) -> Package {
    let mut pkg = Package::new("BioD_Test").with_config(config);
    pkg.find_or_add_name("None");

    let core = add_import(&mut pkg, "Core", "Package", EntryRef::Root);
    let engine = add_import(&mut pkg, "Engine", "Package", EntryRef::Root);
    add_import(&mut pkg, "Object", "Class", core);
    let world_class = add_import(&mut pkg, "World", "Class", engine);
    let level_class = add_import(&mut pkg, "Level", "Class", engine);
    let actor_class = add_import(&mut pkg, "StaticMeshActor", "Class", engine);
    let component_class = add_import(&mut pkg, "StaticMeshComponent", "Class", engine);
    let meshes = add_import(&mut pkg, "EngineMeshes", "Package", EntryRef::Root);
    let cube = add_import(&mut pkg, "Cube", "StaticMesh", meshes);
    assert_eq!(cube, EntryRef::Import(8));

    let world = add_export(&mut pkg, "TheWorld", 0, EntryRef::Root, world_class, vec![]);
    let level = add_export(
        &mut pkg,
        "PersistentLevel",
        0,
        world,
        level_class,
        vec![Property::new("LightmapTotalSize", PropertyValue::Float(2.0))],
    );
    let first = EntryRef::Export(2);
    let second = EntryRef::Export(3);
    let component = EntryRef::Export(4);

    add_export(
        &mut pkg,
        "StaticMeshActor",
        1,
        level,
        actor_class,
        vec![
            Property::object("Base", second),
            Property {
                name: NameRef::new("StaticMeshComponent", 0),
                array_index: 0,
                value: PropertyValue::Object {
                    kind: crate::properties::ObjectKind::Component,
                    target: component,
                },
            },
            Property::new("Tag", PropertyValue::Name(NameRef::new("Crate", 0))),
        ],
    );
    add_export(&mut pkg, "StaticMeshActor", 2, level, actor_class, vec![Property::object("Base", first)]);
    add_export(
        &mut pkg,
        "StaticMeshComponent",
        1,
        first,
        component_class,
        vec![Property::object("Owner", first), Property::object("StaticMesh", cube)],
    );

    pkg.commit_changes();
    pkg
}

/// [`sample_package_with`] using the default configuration
pub fn sample_package() -> Package {
    sample_package_with(Arc::new(EngineConfig::default()))
}

/// Export #5 "Foo" and import #-2 "Bar", both at the root
pub fn scenario_package() -> Package {
    let mut pkg = Package::new("Scenario");
    pkg.find_or_add_name("None");
    let core = add_import(&mut pkg, "Core", "Package", EntryRef::Root);
    add_import(&mut pkg, "Bar", "Package", EntryRef::Root);
    let object_class = add_import(&mut pkg, "Object", "Class", core);

    for name in ["Alpha", "Beta", "Gamma", "Delta"] {
        add_export(&mut pkg, name, 0, EntryRef::Root, object_class, vec![]);
    }
    let foo = EntryRef::Export(4);
    add_export(&mut pkg, "Foo", 0, EntryRef::Root, object_class, vec![Property::object("Myself", foo)]);
    pkg.commit_changes();
    pkg
}
