use umbra::{
    Accessor, Bound, LabelId, PropertyId, PropertyValue, Storage, StorageConfig, VertexAccessor,
    View,
};

fn storage() -> Storage {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    Storage::new(StorageConfig::default())
}

struct Names {
    prop_id: PropertyId,
    prop_val: PropertyId,
    label1: LabelId,
    label2: LabelId,
}

fn names(storage: &Storage) -> Names {
    let acc = storage.access();
    Names {
        prop_id: acc.name_to_property("id"),
        prop_val: acc.name_to_property("val"),
        label1: acc.name_to_label("label1"),
        label2: acc.name_to_label("label2"),
    }
}

fn create_vertex<'a>(
    acc: &'a Accessor<'_>,
    prop_id: PropertyId,
    counter: &mut i64,
) -> VertexAccessor<'a> {
    let vertex = acc.create_vertex().expect("create vertex");
    vertex
        .set_property(prop_id, PropertyValue::Int(*counter))
        .expect("set id");
    *counter += 1;
    vertex
}

fn ids<'a>(
    iter: impl Iterator<Item = VertexAccessor<'a>>,
    prop_id: PropertyId,
    view: View,
) -> Vec<i64> {
    let mut out: Vec<i64> = iter
        .map(|vertex| {
            vertex
                .get_property(prop_id, view)
                .expect("vertex visible")
                .as_int()
                .expect("integer id")
        })
        .collect();
    out.sort_unstable();
    out
}

#[test]
fn label_index_basic() {
    // 1. Create 10 vertices numbered 0 to 9.
    // 2. Add label1 to odd numbered, label2 to even numbered vertices.
    // 3. Remove label1 from odd numbered vertices, add it to even numbered.
    // 4. Delete even numbered vertices.
    let storage = storage();
    let n = names(&storage);
    let mut counter = 0;

    let acc = storage.access();
    let empty: Vec<i64> = vec![];
    assert_eq!(
        ids(
            acc.vertices_by_label(n.label1, View::Old).expect("scan"),
            n.prop_id,
            View::Old
        ),
        empty
    );
    assert_eq!(
        ids(
            acc.vertices_by_label(n.label1, View::New).expect("scan"),
            n.prop_id,
            View::New
        ),
        empty
    );

    for i in 0..10 {
        let vertex = create_vertex(&acc, n.prop_id, &mut counter);
        let label = if i % 2 == 1 { n.label1 } else { n.label2 };
        assert!(vertex.add_label(label).expect("add label"));
    }

    assert_eq!(
        ids(
            acc.vertices_by_label(n.label1, View::Old).expect("scan"),
            n.prop_id,
            View::Old
        ),
        empty
    );
    assert_eq!(
        ids(
            acc.vertices_by_label(n.label1, View::New).expect("scan"),
            n.prop_id,
            View::New
        ),
        vec![1, 3, 5, 7, 9]
    );
    assert_eq!(
        ids(
            acc.vertices_by_label(n.label2, View::New).expect("scan"),
            n.prop_id,
            View::New
        ),
        vec![0, 2, 4, 6, 8]
    );

    acc.advance_command();
    for view in [View::Old, View::New] {
        assert_eq!(
            ids(
                acc.vertices_by_label(n.label1, view).expect("scan"),
                n.prop_id,
                view
            ),
            vec![1, 3, 5, 7, 9]
        );
        assert_eq!(
            ids(
                acc.vertices_by_label(n.label2, view).expect("scan"),
                n.prop_id,
                view
            ),
            vec![0, 2, 4, 6, 8]
        );
    }

    for vertex in acc.vertices(View::Old).expect("scan") {
        let id = vertex
            .get_property(n.prop_id, View::Old)
            .expect("visible")
            .as_int()
            .expect("int");
        if id % 2 == 1 {
            assert!(vertex.remove_label(n.label1).expect("remove label"));
        } else {
            assert!(vertex.add_label(n.label1).expect("add label"));
        }
    }

    assert_eq!(
        ids(
            acc.vertices_by_label(n.label1, View::Old).expect("scan"),
            n.prop_id,
            View::Old
        ),
        vec![1, 3, 5, 7, 9]
    );
    assert_eq!(
        ids(
            acc.vertices_by_label(n.label2, View::Old).expect("scan"),
            n.prop_id,
            View::Old
        ),
        vec![0, 2, 4, 6, 8]
    );
    assert_eq!(
        ids(
            acc.vertices_by_label(n.label1, View::New).expect("scan"),
            n.prop_id,
            View::New
        ),
        vec![0, 2, 4, 6, 8]
    );
    assert_eq!(
        ids(
            acc.vertices_by_label(n.label2, View::New).expect("scan"),
            n.prop_id,
            View::New
        ),
        vec![0, 2, 4, 6, 8]
    );

    let even: Vec<VertexAccessor> = acc
        .vertices(View::Old)
        .expect("scan")
        .filter(|vertex| {
            vertex
                .get_property(n.prop_id, View::Old)
                .expect("visible")
                .as_int()
                .expect("int")
                % 2
                == 0
        })
        .collect();
    for vertex in &even {
        assert!(acc.delete_vertex(vertex).expect("delete"));
    }

    assert_eq!(
        ids(
            acc.vertices_by_label(n.label1, View::Old).expect("scan"),
            n.prop_id,
            View::Old
        ),
        vec![1, 3, 5, 7, 9]
    );
    assert_eq!(
        ids(
            acc.vertices_by_label(n.label2, View::Old).expect("scan"),
            n.prop_id,
            View::Old
        ),
        vec![0, 2, 4, 6, 8]
    );
    assert_eq!(
        ids(
            acc.vertices_by_label(n.label1, View::New).expect("scan"),
            n.prop_id,
            View::New
        ),
        empty
    );
    assert_eq!(
        ids(
            acc.vertices_by_label(n.label2, View::New).expect("scan"),
            n.prop_id,
            View::New
        ),
        empty
    );

    acc.advance_command();
    for view in [View::Old, View::New] {
        assert_eq!(
            ids(
                acc.vertices_by_label(n.label1, view).expect("scan"),
                n.prop_id,
                view
            ),
            empty
        );
        assert_eq!(
            ids(
                acc.vertices_by_label(n.label2, view).expect("scan"),
                n.prop_id,
                view
            ),
            empty
        );
    }
}

#[test]
fn label_index_duplicate_versions() {
    // Removing a label and adding it back creates duplicate index entries
    // for the same vertex differing only in timestamp; scans must fold
    // them into one emission.
    let storage = storage();
    let n = names(&storage);
    let mut counter = 0;

    {
        let mut acc = storage.access();
        for _ in 0..5 {
            let vertex = create_vertex(&acc, n.prop_id, &mut counter);
            assert!(vertex.add_label(n.label1).expect("add label"));
        }
        assert_eq!(
            ids(
                acc.vertices_by_label(n.label1, View::New).expect("scan"),
                n.prop_id,
                View::New
            ),
            vec![0, 1, 2, 3, 4]
        );
        acc.commit().expect("commit");
    }

    let acc = storage.access();
    assert_eq!(
        ids(
            acc.vertices_by_label(n.label1, View::Old).expect("scan"),
            n.prop_id,
            View::Old
        ),
        vec![0, 1, 2, 3, 4]
    );

    for vertex in acc.vertices(View::Old).expect("scan") {
        assert!(vertex.remove_label(n.label1).expect("remove"));
    }
    assert_eq!(
        ids(
            acc.vertices_by_label(n.label1, View::Old).expect("scan"),
            n.prop_id,
            View::Old
        ),
        vec![0, 1, 2, 3, 4]
    );
    assert!(acc
        .vertices_by_label(n.label1, View::New)
        .expect("scan")
        .next()
        .is_none());

    for vertex in acc.vertices(View::Old).expect("scan") {
        assert!(vertex.add_label(n.label1).expect("re-add"));
    }
    assert_eq!(
        ids(
            acc.vertices_by_label(n.label1, View::Old).expect("scan"),
            n.prop_id,
            View::Old
        ),
        vec![0, 1, 2, 3, 4]
    );
    assert_eq!(
        ids(
            acc.vertices_by_label(n.label1, View::New).expect("scan"),
            n.prop_id,
            View::New
        ),
        vec![0, 1, 2, 3, 4]
    );
}

#[test]
fn label_index_transactional_isolation() {
    let storage = storage();
    let n = names(&storage);
    let mut counter = 0;

    let before = storage.access();
    let mut acc = storage.access();
    let after = storage.access();

    for _ in 0..5 {
        let vertex = create_vertex(&acc, n.prop_id, &mut counter);
        assert!(vertex.add_label(n.label1).expect("add label"));
    }

    assert_eq!(
        ids(
            acc.vertices_by_label(n.label1, View::New).expect("scan"),
            n.prop_id,
            View::New
        ),
        vec![0, 1, 2, 3, 4]
    );
    assert!(before
        .vertices_by_label(n.label1, View::New)
        .expect("scan")
        .next()
        .is_none());
    assert!(after
        .vertices_by_label(n.label1, View::New)
        .expect("scan")
        .next()
        .is_none());

    acc.commit().expect("commit");
    let after_commit = storage.access();

    assert!(before
        .vertices_by_label(n.label1, View::New)
        .expect("scan")
        .next()
        .is_none());
    assert!(after
        .vertices_by_label(n.label1, View::New)
        .expect("scan")
        .next()
        .is_none());
    assert_eq!(
        ids(
            after_commit
                .vertices_by_label(n.label1, View::New)
                .expect("scan"),
            n.prop_id,
            View::New
        ),
        vec![0, 1, 2, 3, 4]
    );
}

#[test]
fn label_property_index_create_and_drop() {
    let storage = storage();
    let n = names(&storage);

    assert!(storage.create_index(n.label1, n.prop_id));
    assert!(storage.label_property_index_exists(n.label1, n.prop_id));
    assert!(!storage.label_property_index_exists(n.label2, n.prop_id));
    assert!(!storage.create_index(n.label1, n.prop_id));

    assert!(storage.create_index(n.label2, n.prop_id));
    assert!(storage.label_property_index_exists(n.label2, n.prop_id));
    assert_eq!(
        storage.list_all_indices().label_property,
        vec![(n.label1, n.prop_id), (n.label2, n.prop_id)]
    );

    assert!(storage.drop_index(n.label1, n.prop_id));
    assert!(!storage.label_property_index_exists(n.label1, n.prop_id));
    assert!(!storage.drop_index(n.label1, n.prop_id));

    assert!(storage.drop_index(n.label2, n.prop_id));
    assert!(!storage.label_property_index_exists(n.label2, n.prop_id));

    let acc = storage.access();
    assert!(acc
        .vertices_by_label_property(n.label1, n.prop_id, View::New)
        .is_err());
}

#[test]
fn label_property_index_basic() {
    let storage = storage();
    let n = names(&storage);
    assert!(storage.create_index(n.label1, n.prop_val));
    assert!(storage.create_index(n.label2, n.prop_val));
    let mut counter = 0;
    let empty: Vec<i64> = vec![];

    let acc = storage.access();
    assert_eq!(
        ids(
            acc.vertices_by_label_property(n.label1, n.prop_val, View::Old)
                .expect("scan"),
            n.prop_id,
            View::Old
        ),
        empty
    );

    for i in 0..10 {
        let vertex = create_vertex(&acc, n.prop_id, &mut counter);
        let label = if i % 2 == 1 { n.label1 } else { n.label2 };
        assert!(vertex.add_label(label).expect("add label"));
        assert!(vertex
            .set_property(n.prop_val, PropertyValue::Int(i))
            .expect("set val"));
    }

    assert_eq!(
        ids(
            acc.vertices_by_label_property(n.label1, n.prop_val, View::Old)
                .expect("scan"),
            n.prop_id,
            View::Old
        ),
        empty
    );
    assert_eq!(
        ids(
            acc.vertices_by_label_property(n.label1, n.prop_val, View::New)
                .expect("scan"),
            n.prop_id,
            View::New
        ),
        vec![1, 3, 5, 7, 9]
    );
    assert_eq!(
        ids(
            acc.vertices_by_label_property(n.label2, n.prop_val, View::New)
                .expect("scan"),
            n.prop_id,
            View::New
        ),
        vec![0, 2, 4, 6, 8]
    );

    acc.advance_command();

    // Null out the odd values, spread label1 onto the even vertices.
    for vertex in acc.vertices(View::Old).expect("scan") {
        let id = vertex
            .get_property(n.prop_id, View::Old)
            .expect("visible")
            .as_int()
            .expect("int");
        if id % 2 == 1 {
            assert!(vertex
                .set_property(n.prop_val, PropertyValue::Null)
                .expect("clear"));
        } else {
            assert!(vertex.add_label(n.label1).expect("add label"));
        }
    }

    assert_eq!(
        ids(
            acc.vertices_by_label_property(n.label1, n.prop_val, View::Old)
                .expect("scan"),
            n.prop_id,
            View::Old
        ),
        vec![1, 3, 5, 7, 9]
    );
    assert_eq!(
        ids(
            acc.vertices_by_label_property(n.label2, n.prop_val, View::Old)
                .expect("scan"),
            n.prop_id,
            View::Old
        ),
        vec![0, 2, 4, 6, 8]
    );
    assert_eq!(
        ids(
            acc.vertices_by_label_property(n.label1, n.prop_val, View::New)
                .expect("scan"),
            n.prop_id,
            View::New
        ),
        vec![0, 2, 4, 6, 8]
    );
    assert_eq!(
        ids(
            acc.vertices_by_label_property(n.label2, n.prop_val, View::New)
                .expect("scan"),
            n.prop_id,
            View::New
        ),
        vec![0, 2, 4, 6, 8]
    );
}

#[test]
fn label_property_index_duplicate_versions() {
    let storage = storage();
    let n = names(&storage);
    assert!(storage.create_index(n.label1, n.prop_val));
    let mut counter = 0;

    {
        let mut acc = storage.access();
        for i in 0..5 {
            let vertex = create_vertex(&acc, n.prop_id, &mut counter);
            assert!(vertex.add_label(n.label1).expect("add label"));
            assert!(vertex
                .set_property(n.prop_val, PropertyValue::Int(i))
                .expect("set val"));
        }
        assert_eq!(
            ids(
                acc.vertices_by_label_property(n.label1, n.prop_val, View::New)
                    .expect("scan"),
                n.prop_id,
                View::New
            ),
            vec![0, 1, 2, 3, 4]
        );
        acc.commit().expect("commit");
    }

    let acc = storage.access();
    assert_eq!(
        ids(
            acc.vertices_by_label_property(n.label1, n.prop_val, View::Old)
                .expect("scan"),
            n.prop_id,
            View::Old
        ),
        vec![0, 1, 2, 3, 4]
    );

    for vertex in acc.vertices(View::Old).expect("scan") {
        assert!(vertex
            .set_property(n.prop_val, PropertyValue::Null)
            .expect("clear"));
    }
    assert_eq!(
        ids(
            acc.vertices_by_label_property(n.label1, n.prop_val, View::Old)
                .expect("scan"),
            n.prop_id,
            View::Old
        ),
        vec![0, 1, 2, 3, 4]
    );
    assert!(acc
        .vertices_by_label_property(n.label1, n.prop_val, View::New)
        .expect("scan")
        .next()
        .is_none());

    for vertex in acc.vertices(View::Old).expect("scan") {
        assert!(vertex
            .set_property(n.prop_val, PropertyValue::Int(42))
            .expect("re-set"));
    }
    assert_eq!(
        ids(
            acc.vertices_by_label_property(n.label1, n.prop_val, View::Old)
                .expect("scan"),
            n.prop_id,
            View::Old
        ),
        vec![0, 1, 2, 3, 4]
    );
    assert_eq!(
        ids(
            acc.vertices_by_label_property(n.label1, n.prop_val, View::New)
                .expect("scan"),
            n.prop_id,
            View::New
        ),
        vec![0, 1, 2, 3, 4]
    );
}

#[test]
fn label_property_index_filtering() {
    // Values are 0 0.0 1 1.0 2 2.0 3 3.0 4 4.0, a mix of integers and
    // doubles, so ranges must compare numerically across the two types.
    let storage = storage();
    let n = names(&storage);
    assert!(storage.create_index(n.label1, n.prop_val));
    let mut counter = 0;

    {
        let mut acc = storage.access();
        for i in 0..10i64 {
            let vertex = create_vertex(&acc, n.prop_id, &mut counter);
            assert!(vertex.add_label(n.label1).expect("add label"));
            let value = if i % 2 == 1 {
                PropertyValue::Int(i / 2)
            } else {
                PropertyValue::double(i as f64 / 2.0).expect("finite")
            };
            assert!(vertex.set_property(n.prop_val, value).expect("set val"));
        }
        acc.commit().expect("commit");
    }

    let acc = storage.access();
    for i in 0..5i64 {
        assert_eq!(
            ids(
                acc.vertices_by_label_property_value(
                    n.label1,
                    n.prop_val,
                    &PropertyValue::Int(i),
                    View::Old
                )
                .expect("scan"),
                n.prop_id,
                View::Old
            ),
            vec![2 * i, 2 * i + 1]
        );
    }

    let range = |lower: Option<Bound<PropertyValue>>, upper: Option<Bound<PropertyValue>>| {
        ids(
            acc.vertices_by_label_property_range(n.label1, n.prop_val, lower, upper, View::Old)
                .expect("scan"),
            n.prop_id,
            View::Old,
        )
    };

    // [1, +inf)
    assert_eq!(
        range(Some(Bound::Included(PropertyValue::Int(1))), None),
        vec![2, 3, 4, 5, 6, 7, 8, 9]
    );
    // (1, +inf)
    assert_eq!(
        range(Some(Bound::Excluded(PropertyValue::Int(1))), None),
        vec![4, 5, 6, 7, 8, 9]
    );
    // (-inf, 3]
    assert_eq!(
        range(None, Some(Bound::Included(PropertyValue::Int(3)))),
        vec![0, 1, 2, 3, 4, 5, 6, 7]
    );
    // (-inf, 3)
    assert_eq!(
        range(None, Some(Bound::Excluded(PropertyValue::Int(3)))),
        vec![0, 1, 2, 3, 4, 5]
    );
    // [1, 3]
    assert_eq!(
        range(
            Some(Bound::Included(PropertyValue::Int(1))),
            Some(Bound::Included(PropertyValue::Int(3)))
        ),
        vec![2, 3, 4, 5, 6, 7]
    );
    // (1, 3]
    assert_eq!(
        range(
            Some(Bound::Excluded(PropertyValue::Int(1))),
            Some(Bound::Included(PropertyValue::Int(3)))
        ),
        vec![4, 5, 6, 7]
    );
    // [1, 3)
    assert_eq!(
        range(
            Some(Bound::Included(PropertyValue::Int(1))),
            Some(Bound::Excluded(PropertyValue::Int(3)))
        ),
        vec![2, 3, 4, 5]
    );
    // (1, 3)
    assert_eq!(
        range(
            Some(Bound::Excluded(PropertyValue::Int(1))),
            Some(Bound::Excluded(PropertyValue::Int(3)))
        ),
        vec![4, 5]
    );
}

#[test]
fn label_property_index_backfills_committed_data() {
    let storage = storage();
    let n = names(&storage);
    let mut counter = 0;

    {
        let mut acc = storage.access();
        for i in 0..5 {
            let vertex = create_vertex(&acc, n.prop_id, &mut counter);
            assert!(vertex.add_label(n.label1).expect("add label"));
            assert!(vertex
                .set_property(n.prop_val, PropertyValue::Int(i))
                .expect("set val"));
        }
        // This one has the label but no value: back-fill must skip it.
        let bare = create_vertex(&acc, n.prop_id, &mut counter);
        assert!(bare.add_label(n.label1).expect("add label"));
        acc.commit().expect("commit");
    }

    assert!(storage.create_index(n.label1, n.prop_val));
    let acc = storage.access();
    assert_eq!(
        ids(
            acc.vertices_by_label_property(n.label1, n.prop_val, View::Old)
                .expect("scan"),
            n.prop_id,
            View::Old
        ),
        vec![0, 1, 2, 3, 4]
    );
}

#[test]
fn clearing_property_removes_from_index_view() {
    let storage = storage();
    let n = names(&storage);
    assert!(storage.create_index(n.label1, n.prop_val));
    let mut counter = 0;

    {
        let mut acc = storage.access();
        let vertex = create_vertex(&acc, n.prop_id, &mut counter);
        assert!(vertex.add_label(n.label1).expect("add label"));
        assert!(vertex
            .set_property(n.prop_val, PropertyValue::Int(42))
            .expect("set val"));
        acc.commit().expect("commit");
    }

    let acc = storage.access();
    for vertex in acc.vertices(View::Old).expect("scan") {
        assert!(vertex.clear_property(n.prop_val).expect("clear"));
    }
    assert!(acc
        .vertices_by_label_property(n.label1, n.prop_val, View::New)
        .expect("scan")
        .next()
        .is_none());
    assert_eq!(
        ids(
            acc.vertices_by_label_property(n.label1, n.prop_val, View::Old)
                .expect("scan"),
            n.prop_id,
            View::Old
        ),
        vec![0]
    );
}

#[test]
fn label_index_exists_tracks_first_use() {
    let storage = storage();
    let n = names(&storage);
    assert!(!storage.label_index_exists(n.label1));

    let mut acc = storage.access();
    let vertex = acc.create_vertex().expect("create");
    assert!(vertex.add_label(n.label1).expect("add label"));
    assert!(storage.label_index_exists(n.label1));
    assert_eq!(storage.list_all_indices().label, vec![n.label1]);
    acc.commit().expect("commit");
}
