//! Write/read round trips over packed chip archives.

use chip_grid::CHIP_SIZE;
use chip_raster::{Chip, ChipFrame};
use chip_store::{CellRecord, ChipStore, ChipStoreWriter};
use test_utils::{label_chip, multiband_chip, test_acquired, utm_frame};

fn frame(cell_id: &str, offset: f64) -> ChipFrame {
    utm_frame(cell_id, 32633, 500000.0 + offset, 100000.0)
}

fn chip_with_nans(cell_id: &str, offset: f64, value: f32) -> Chip {
    let mut chip = label_chip(&frame(cell_id, offset), value);
    // A few NaN pixels survive the round trip as NaN
    chip.data[0] = f32::NAN;
    chip.data[1] = f32::NAN;
    chip
}

#[test]
fn write_then_read_identity() {
    let acquired = test_acquired();
    let out = tempfile::tempdir().unwrap();
    let dest = out.path().join("labels.zarr.zip");

    let mut writer = ChipStoreWriter::create(&dest, acquired).unwrap();
    writer.write_chip(&chip_with_nans("2U_5R", 0.0, 3.0)).unwrap();
    writer
        .write_chip(&chip_with_nans("2U_4R", 2640.0, 7.0))
        .unwrap();
    let path = writer.finish().unwrap();
    assert!(path.exists());

    let store = ChipStore::open(&path).unwrap();
    assert_eq!(store.acquired(), acquired);
    // Index order is sorted by cell id
    assert_eq!(store.cell_ids(), vec!["2U_4R", "2U_5R"]);

    let chip = store.read_chip("2U_5R").unwrap();
    assert_eq!(chip.cell_id, "2U_5R");
    assert_eq!(chip.epsg, 32633);
    assert_eq!(chip.bands, vec!["labels"]);
    assert_eq!(chip.acquired, acquired);
    assert!(chip.data[0].is_nan());
    assert!(chip.data[1].is_nan());
    assert_eq!(chip.data[2], 3.0);
    assert_eq!(chip.data.len(), CHIP_SIZE * CHIP_SIZE);

    let rec = store.record("2U_4R").unwrap();
    assert_eq!(rec.transform[0], 502640.0);
}

#[test]
fn duplicate_cell_rejected() {
    let out = tempfile::tempdir().unwrap();
    let dest = out.path().join("labels.zarr.zip");

    let mut writer = ChipStoreWriter::create(&dest, test_acquired()).unwrap();
    writer.write_chip(&label_chip(&frame("2U_5R", 0.0), 1.0)).unwrap();
    assert!(writer
        .write_chip(&label_chip(&frame("2U_5R", 0.0), 1.0))
        .is_err());
}

#[test]
fn append_requires_seeded_cell() {
    let out = tempfile::tempdir().unwrap();
    let dest = out.path().join("s1rtc.zarr.zip");

    let mut writer = ChipStoreWriter::create(&dest, test_acquired()).unwrap();
    writer.seed_cells(vec![CellRecord::from(&frame("2U_5R", 0.0))]);

    // Seeded cell goes through
    writer
        .append_chip(&label_chip(&frame("2U_5R", 0.0), 1.0))
        .unwrap();
    // A cell outside the seeded set is a store error
    let err = writer
        .append_chip(&label_chip(&frame("9U_9R", 5280.0), 1.0))
        .unwrap_err();
    assert!(err.to_string().contains("not part of this store"));
}

#[test]
fn empty_store_refuses_to_pack() {
    let out = tempfile::tempdir().unwrap();
    let dest = out.path().join("empty.zarr.zip");
    let writer = ChipStoreWriter::create(&dest, test_acquired()).unwrap();
    assert!(writer.finish().is_err());
    assert!(!dest.exists());
}

#[test]
fn multiband_round_trip() {
    let f = frame("0U_0R", 0.0);
    let chip = multiband_chip(&f, &[("vv", 0.1), ("vh", 0.2)]);

    let out = tempfile::tempdir().unwrap();
    let dest = out.path().join("s1rtc.zarr.zip");
    let mut writer = ChipStoreWriter::create(&dest, chip.acquired).unwrap();
    writer.write_chip(&chip).unwrap();
    let path = writer.finish().unwrap();

    let store = ChipStore::open(&path).unwrap();
    let back = store.read_chip("0U_0R").unwrap();
    assert_eq!(back.bands, vec!["vv", "vh"]);
    assert_eq!(back.band("vv").unwrap()[0], 0.1);
    assert_eq!(back.band("vh").unwrap()[0], 0.2);
}
