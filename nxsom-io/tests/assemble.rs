use approx::assert_relative_eq;
use nxsom_core::{
    enumerate_ids, AttrEntry, DatasetType, GeometryRecord, InstrumentGeometry, NxParameter,
    ParameterValue, PixelId, Selector,
};
use nxsom_io::{
    AssembleRequest, Assembler, AttrValue, BlockId, DataView, Error, ExtractRequest,
    MemoryContainer, TreeIndex,
};
use std::io::Write;
use tempfile::NamedTempFile;

const DATA: &str = "/entry/bank1/data";

fn add_axis(container: &mut MemoryContainer, path: &str, number: i64, values: Vec<f64>) {
    container
        .add_vector(path, values)
        .set_attr(path, "axis", number.into())
        .set_attr(path, "primary", 1_i64.into());
}

fn add_signal(container: &mut MemoryContainer, path: &str, shape: &[usize], values: Vec<f64>) {
    container
        .add_field(path, shape, values)
        .set_attr(path, "signal", 1_i64.into())
        .set_attr(path, "units", "counts".into());
}

/// One 2 x 3 bank with 4 histogram channels per pixel, plus a monitor.
fn grid_file() -> MemoryContainer {
    let mut container = MemoryContainer::new("grid.nxs");
    fill_grid(&mut container);
    container
}

fn fill_grid(container: &mut MemoryContainer) {
    container
        .add_group("/entry", "NXentry")
        .add_text("/entry/title", "vanadium rod")
        .add_text("/entry/run_number", "1234")
        .add_scalar("/entry/proton_charge", 2.0)
        .set_attr("/entry/proton_charge", "units", "microAmp*hour".into())
        .add_group("/entry/instrument", "NXinstrument")
        .add_text("/entry/instrument/name", "TEST INSTRUMENT")
        .set_attr("/entry/instrument/name", "short_name", "TST".into())
        .add_group("/entry/instrument/moderator", "NXmoderator")
        .add_scalar("/entry/instrument/moderator/distance", -20.0)
        .add_group("/entry/instrument/bank1", "NXdetector")
        .add_scalar("/entry/instrument/bank1/distance", 2.5)
        .add_field(
            "/entry/instrument/bank1/polar_angle",
            &[2, 3],
            vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6],
        )
        .add_group("/entry/sample", "NXsample")
        .add_text("/entry/sample/name", "V")
        .add_group("/entry/bank1", "NXdata");

    add_signal(container, DATA, &[2, 3, 4], (0..24).map(f64::from).collect());
    add_axis(container, "/entry/bank1/y_pixel", 1, vec![0.0, 1.0]);
    add_axis(container, "/entry/bank1/x_pixel", 2, vec![0.0, 1.0, 2.0]);
    add_axis(
        container,
        "/entry/bank1/time_of_flight",
        3,
        vec![0.0, 10.0, 20.0, 30.0, 40.0],
    );
    container.set_attr("/entry/bank1/time_of_flight", "units", "microsecond".into());

    container
        .add_group("/entry/monitor1", "NXmonitor")
        .add_scalar("/entry/monitor1/distance", -1.5);
    add_signal(container, "/entry/monitor1/data", &[4], vec![7.0; 4]);
    add_axis(
        container,
        "/entry/monitor1/time_of_flight",
        1,
        vec![0.0, 10.0, 20.0, 30.0, 40.0],
    );
}

fn write_list(lines: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file
}

#[test]
fn test_assemble_grid_histogram() {
    let mut assembler = Assembler::new(grid_file());
    let collection = assembler.assemble(&AssembleRequest::new()).unwrap();

    assert_eq!(collection.title, "vanadium rod");
    assert_eq!(collection.dataset_type, Some(DatasetType::Histogram));
    assert_eq!(collection.axis_label, "time_of_flight");
    assert_eq!(collection.axis_units.as_deref(), Some("microsecond"));
    assert_eq!(collection.y_label, "data");
    assert_eq!(collection.y_units.as_deref(), Some("counts"));

    let ids: Vec<_> = collection.iter().map(|s| s.id.to_string()).collect();
    assert_eq!(
        ids,
        vec!["bank1_0_0", "bank1_0_1", "bank1_0_2", "bank1_1_0", "bank1_1_1", "bank1_1_2"]
    );

    let last = &collection.spectra[5];
    assert_eq!(last.y, vec![20.0, 21.0, 22.0, 23.0]);
    assert_eq!(last.var_y, last.y);
    assert_eq!(last.axis, vec![0.0, 10.0, 20.0, 30.0, 40.0]);

    let attributes = &collection.attributes;
    assert_eq!(
        attributes.get("filename").and_then(AttrEntry::as_text),
        Some("grid.nxs")
    );
    assert_eq!(
        attributes.get("instrument_name").and_then(AttrEntry::as_text),
        Some("TST")
    );
    assert_eq!(attributes.get("beamline"), Some(&AttrEntry::Empty));
    assert!(!attributes.contains_key("mask_file"));
    assert_eq!(
        attributes.get("run_number"),
        Some(&AttrEntry::Parameter(NxParameter {
            value: ParameterValue::Text("1234".to_string()),
            units: None,
        }))
    );
    let Some(AttrEntry::Parameter(charge)) = attributes.get("proton_charge") else {
        panic!("proton charge missing");
    };
    assert_eq!(charge.units.as_deref(), Some("picoCoulomb"));
    let Some(AttrEntry::Sample(sample)) = attributes.get("sample") else {
        panic!("sample missing");
    };
    assert_eq!(sample.name.as_deref(), Some("V"));
}

#[test]
fn test_detector_geometry_attribute() {
    let mut assembler = Assembler::new(grid_file());
    let collection = assembler.assemble(&AssembleRequest::new()).unwrap();

    let Some(AttrEntry::Geometry(InstrumentGeometry::Single(Some(GeometryRecord::Detector(
        detector,
    ))))) = collection.attributes.get("instrument")
    else {
        panic!("expected a single detector geometry");
    };
    assert_relative_eq!(detector.primary.0, 20.0);
    assert_eq!(detector.row_stride, Some(3));

    let secondary = detector.secondary.as_ref().unwrap();
    assert_eq!(secondary.selector, Selector::Constant);
    assert_relative_eq!(secondary.value(1, 2).unwrap().0, 2.5);

    let polar = detector.polar.as_ref().unwrap();
    assert_eq!(polar.selector, Selector::Grid { row_stride: 3 });
    assert_relative_eq!(polar.value(1, 2).unwrap().0, 0.6);
    assert!(detector.azimuthal.is_none());
}

#[test]
fn test_data_block_read_once() {
    let mut assembler = Assembler::new(grid_file());
    assembler.assemble(&AssembleRequest::new()).unwrap();
    assembler.assemble(&AssembleRequest::new()).unwrap();

    let Ok(view) = assembler.view(&BlockId::new("/entry/bank1", 1)) else {
        panic!("bank1 view missing");
    };
    assert!(view.is_cached());
    assert_eq!(view.data_path(), DATA);
}

#[test]
fn test_extraction_reads_block_once() {
    let container = grid_file();
    let tree = TreeIndex::build(&container);
    let mut view = DataView::open(&container, &tree, "/entry/bank1", 1).unwrap();
    let (_, channel_count) = view.classify(2).unwrap();
    let request = ExtractRequest {
        variable: 2,
        channel_count,
        row_extent: 3,
        offset: None,
    };
    for id in view.ids(2).unwrap() {
        view.extract(&container, &id, &request).unwrap();
    }
    assert_eq!(container.value_reads(DATA), 1);
    assert_eq!(container.slab_reads(), 0);
}

#[test]
fn test_one_dimensional_histogram() {
    let mut container = MemoryContainer::new("single.nxs");
    container
        .add_group("/entry", "NXentry")
        .add_group("/entry/spectrum", "NXdata");
    add_signal(&mut container, "/entry/spectrum/counts", &[4], vec![1.0, 2.0, 3.0, 4.0]);
    add_axis(
        &mut container,
        "/entry/spectrum/time_of_flight",
        1,
        vec![0.0, 1.0, 2.0, 3.0, 4.0],
    );

    let mut assembler = Assembler::new(container);
    let collection = assembler.assemble(&AssembleRequest::new()).unwrap();

    assert_eq!(collection.title, "");
    assert_eq!(collection.dataset_type, Some(DatasetType::Histogram));
    assert_eq!(collection.len(), 1);
    let spectrum = &collection.spectra[0];
    assert_eq!(spectrum.id, PixelId::Flat(0));
    assert_eq!(spectrum.axis, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    assert_eq!(spectrum.y, vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(
        collection.attributes.get("instrument"),
        Some(&AttrEntry::Geometry(InstrumentGeometry::Single(None)))
    );
}

#[test]
fn test_range_is_clamped() {
    let mut assembler = Assembler::new(grid_file());
    let request = AssembleRequest::new().with_range(
        Some(PixelId::grid("bank1", 1, 0)),
        Some(PixelId::grid("bank1", 5, 2)),
    );
    let collection = assembler.assemble(&request).unwrap();

    let ids: Vec<_> = collection.iter().map(|s| s.id.clone()).collect();
    assert_eq!(
        ids,
        vec![PixelId::grid("bank1", 1, 0), PixelId::grid("bank1", 1, 1)]
    );
    assert_eq!(collection.spectra[1].y, vec![16.0, 17.0, 18.0, 19.0]);
}

#[test]
fn test_mask_file() {
    let mask = write_list(&["# dead tubes", "bank1_0_0", "bank1_0_1", "bank2_0_2"]);
    let mut assembler = Assembler::new(grid_file());
    let collection = assembler
        .assemble(&AssembleRequest::new().with_mask_file(mask.path()))
        .unwrap();

    assert_eq!(collection.len(), 4);
    assert!(collection
        .iter()
        .all(|s| s.id != PixelId::grid("bank1", 0, 0) && s.id != PixelId::grid("bank1", 0, 1)));
    assert_eq!(
        collection.attributes.get("mask_file").and_then(AttrEntry::as_text),
        Some(mask.path().display().to_string().as_str())
    );
}

#[test]
fn test_roi_file() {
    let roi = write_list(&["bank2_0_0", "bank1_1_1", "", "bank1_0_2"]);
    let mut assembler = Assembler::new(grid_file());
    let collection = assembler
        .assemble(&AssembleRequest::new().with_roi_file(roi.path()))
        .unwrap();

    let ids: Vec<_> = collection.iter().map(|s| s.id.clone()).collect();
    assert_eq!(
        ids,
        vec![PixelId::grid("bank1", 1, 1), PixelId::grid("bank1", 0, 2)]
    );
    assert!(collection.attributes.contains_key("roi_file"));
}

#[test]
fn test_roi_entry_outside_bank() {
    let roi = write_list(&["bank1_0_2", "bank1_0_3"]);
    let mut assembler = Assembler::new(grid_file());
    let err = assembler
        .assemble(&AssembleRequest::new().with_roi_file(roi.path()))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::CoreError(nxsom_core::Error::IndexOutOfRange { index: 3, len: 3 })
    ));
}

#[test]
fn test_full_range_ids_match_enumeration() {
    let container = grid_file();
    let tree = TreeIndex::build(&container);
    let view = DataView::open(&container, &tree, "/entry/bank1", 1).unwrap();

    for axis in ["time_of_flight", "x_pixel"] {
        let variable = view.axis_index(axis).unwrap();
        let expected =
            enumerate_ids(&view.id_min(), &view.id_max(variable).unwrap(), "bank1").unwrap();

        let mut assembler = Assembler::new(grid_file());
        let collection = assembler
            .assemble(&AssembleRequest::new().with_axis(axis))
            .unwrap();
        let extracted: Vec<_> = collection.iter().map(|s| s.id.clone()).collect();
        assert_eq!(extracted, expected, "{axis}");
    }
}

#[test]
fn test_missing_mask_file() {
    let mut assembler = Assembler::new(grid_file());
    let err = assembler
        .assemble(&AssembleRequest::new().with_mask_file("/nonexistent/mask.dat"))
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn test_tof_offset() {
    let mut assembler = Assembler::new(grid_file());
    let collection = assembler
        .assemble(&AssembleRequest::new().with_tof_offset(5.0))
        .unwrap();

    let spectrum = &collection.spectra[0];
    assert_eq!(spectrum.axis, vec![5.0, 15.0, 25.0, 35.0, 45.0]);
    assert_eq!(spectrum.var_y, vec![0.0, 1.0, 2.0, 3.0]);
}

#[test]
fn test_monitor_block() {
    let mut assembler = Assembler::new(grid_file());
    let monitor = BlockId::new("/entry/monitor1", 1);

    assert_eq!(
        assembler.selected_blocks().unwrap(),
        &[BlockId::new("/entry/bank1", 1)]
    );
    assert!(assembler.block_ids().unwrap().contains(&monitor));

    let collection = assembler
        .assemble(&AssembleRequest::new().with_blocks(vec![monitor]))
        .unwrap();
    assert_eq!(collection.len(), 1);
    assert_eq!(collection.spectra[0].y, vec![7.0; 4]);

    let Some(AttrEntry::Geometry(InstrumentGeometry::Single(Some(GeometryRecord::Monitor(
        geometry,
    ))))) = collection.attributes.get("instrument")
    else {
        panic!("expected monitor geometry");
    };
    assert_relative_eq!(geometry.primary.0, 18.5);
    assert_relative_eq!(geometry.primary.1, 0.0);
}

#[test]
fn test_composite_instrument() {
    let mut assembler = Assembler::new(grid_file());
    assembler.select_block("/entry/monitor1", 1).unwrap();
    let collection = assembler.assemble(&AssembleRequest::new()).unwrap();

    assert_eq!(collection.len(), 7);
    let Some(AttrEntry::Geometry(instrument)) = collection.attributes.get("instrument") else {
        panic!("instrument missing");
    };
    assert!(matches!(instrument, InstrumentGeometry::Composite(banks) if banks.len() == 2));
    assert!(matches!(
        instrument.get("monitor1"),
        Some(GeometryRecord::Monitor(_))
    ));
    assert!(matches!(
        instrument.get("bank1"),
        Some(GeometryRecord::Detector(_))
    ));
}

#[test]
fn test_mixed_dataset_types() {
    let mut container = grid_file();
    container.add_group("/entry/bank2", "NXdata");
    add_signal(&mut container, "/entry/bank2/data", &[3, 4], vec![1.0; 12]);
    add_axis(&mut container, "/entry/bank2/pixel", 1, vec![0.0, 1.0, 2.0]);
    add_axis(
        &mut container,
        "/entry/bank2/time_of_flight",
        2,
        vec![0.0, 10.0, 20.0, 30.0],
    );

    let mut assembler = Assembler::new(container);
    assert_eq!(assembler.selected_blocks().unwrap().len(), 2);
    let err = assembler.assemble(&AssembleRequest::new()).unwrap_err();
    assert!(matches!(err, Error::Consistency(_)));

    let density = assembler
        .assemble(&AssembleRequest::new().with_blocks(vec![BlockId::new("/entry/bank2", 1)]))
        .unwrap();
    assert_eq!(density.dataset_type, Some(DatasetType::Density));
    assert_eq!(density.len(), 3);
}

#[test]
fn test_linked_group_cycle() {
    let mut container = grid_file();
    container.add_link("/entry/bank1/parent", "/entry");

    let mut assembler = Assembler::new(container);
    let tree = assembler.tree().unwrap();
    assert!(tree.contains("/entry/bank1/parent"));
    assert!(!tree.contains("/entry/bank1/parent/bank1"));

    let collection = assembler.assemble(&AssembleRequest::new()).unwrap();
    assert_eq!(collection.len(), 6);
}

#[test]
fn test_group_link_before_detector() {
    let mut container = MemoryContainer::new("grid.nxs");
    container
        .add_group("/entry", "NXentry")
        .add_group("/entry/bank1", "NXdata");
    fill_grid(&mut container);
    container.add_link("/entry/bank1/detector", "/entry/instrument/bank1");

    let mut assembler = Assembler::new(container);
    let tree = assembler.tree().unwrap();
    assert!(tree.contains("/entry/bank1/detector"));
    assert!(tree.contains("/entry/instrument/bank1/distance"));

    let Some(GeometryRecord::Detector(detector)) = assembler.geometry("/entry/bank1").unwrap()
    else {
        panic!("expected detector geometry");
    };
    let secondary = detector.secondary.as_ref().unwrap();
    assert_relative_eq!(secondary.value(0, 0).unwrap().0, 2.5);
    assert_eq!(detector.row_stride, Some(3));

    let collection = assembler.assemble(&AssembleRequest::new()).unwrap();
    assert_eq!(collection.len(), 6);
}

#[test]
fn test_failing_subtree_degrades() {
    let mut container = grid_file();
    container.fail_listing("/entry/instrument");

    let mut assembler = Assembler::new(container);
    let tree = assembler.tree().unwrap();
    assert_eq!(tree.warnings().len(), 1);
    assert!(tree.contains("/entry/instrument"));
    assert!(!tree.contains("/entry/instrument/bank1"));

    let collection = assembler.assemble(&AssembleRequest::new()).unwrap();
    assert_eq!(collection.len(), 6);
    assert_eq!(
        collection.attributes.get("instrument"),
        Some(&AttrEntry::Geometry(InstrumentGeometry::Single(None)))
    );
}

#[test]
fn test_unreadable_block_skipped() {
    let mut container = grid_file();
    container.add_group("/entry/broken", "NXdata");
    add_signal(&mut container, "/entry/broken/data", &[4], vec![0.0; 4]);

    let assembler = Assembler::new(container);
    let blocks = assembler.block_ids().unwrap();
    assert!(!blocks.contains(&BlockId::new("/entry/broken", 1)));
    assert_eq!(assembler.selected_blocks().unwrap().len(), 1);
}

#[test]
fn test_variable_axis() {
    let mut assembler = Assembler::new(grid_file());
    assert_eq!(assembler.variable_axis(), "time_of_flight");
    assert!(matches!(
        assembler.set_variable_axis("wavelength"),
        Err(Error::Configuration(_))
    ));
    assert_eq!(assembler.variable_axis(), "time_of_flight");

    assembler.set_variable_axis("x_pixel").unwrap();
    let block = BlockId::new("/entry/bank1", 1);
    let ids = assembler.spectrum_ids(&block).unwrap();
    assert_eq!(ids.len(), 8);
    assert_eq!(ids[7], PixelId::grid("bank1", 1, 3));
}

#[test]
fn test_single_spectrum_read() {
    let assembler = Assembler::new(grid_file());
    let block = BlockId::new("/entry/bank1", 1);

    let spectrum = assembler
        .spectrum(&block, &PixelId::grid("bank1", 1, 2), None)
        .unwrap();
    assert_eq!(spectrum.y, vec![20.0, 21.0, 22.0, 23.0]);

    let spectrum = assembler
        .spectrum(&block, &PixelId::grid("bank1", 0, 1), Some("x_pixel"))
        .unwrap();
    assert_eq!(spectrum.y, vec![1.0, 5.0, 9.0]);
    assert_eq!(spectrum.axis, vec![0.0, 1.0, 2.0]);

    assert!(assembler
        .spectrum(&block, &PixelId::grid("bank1", 2, 0), None)
        .is_err());
    assert!(!assembler.view(&block).unwrap().is_cached());
}

#[test]
fn test_geometry_lookup() {
    let assembler = Assembler::new(grid_file());
    assert!(matches!(
        assembler.geometry("/entry/bank1").unwrap(),
        Some(GeometryRecord::Detector(_))
    ));
    assert!(assembler.geometry("/entry/bank9").unwrap().is_none());
    assert_eq!(assembler.instrument_name().unwrap(), Some("TST"));
    assert_eq!(assembler.beamline().unwrap(), None);
}

#[test]
fn test_select_unknown_block() {
    let mut assembler = Assembler::new(grid_file());
    assert!(matches!(
        assembler.select_block("/entry/bank7", 1),
        Err(Error::Configuration(_))
    ));
    let err = assembler
        .assemble(&AssembleRequest::new().with_blocks(vec![BlockId::new("/entry/bank1", 2)]))
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn test_release_is_idempotent() {
    let mut assembler = Assembler::new(grid_file());
    assert!(!assembler.is_released());
    assembler.release();
    assembler.release();
    assert!(assembler.is_released());

    assert!(matches!(
        assembler.assemble(&AssembleRequest::new()),
        Err(Error::Closed)
    ));
    assert!(matches!(assembler.block_ids(), Err(Error::Closed)));
    assert!(matches!(assembler.tree(), Err(Error::Closed)));
    assert!(matches!(
        assembler.geometry("/entry/bank1"),
        Err(Error::Closed)
    ));
}

#[test]
fn test_signal_attribute_numbers() {
    let mut container = grid_file();
    container.set_attr(DATA, "signal", AttrValue::Text("1".to_string()));
    let assembler = Assembler::new(container);
    assert!(assembler
        .block_ids()
        .unwrap()
        .contains(&BlockId::new("/entry/bank1", 1)));
}
