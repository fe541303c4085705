//! Physical volume per segmentation label.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{EngineError, Result};
use crate::geometry::Spacing;
use crate::label_config::LabelNames;
use crate::label_mask::{LabelMask, label_counts};
use crate::volume::VolumeGrid;

const MM3_PER_CM3: f64 = 1000.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelVolume {
    pub label: u16,
    pub name: String,
    pub voxel_count: usize,
    pub volume_cm3: f64,
}

impl LabelVolume {
    pub fn volume_mm3(&self) -> f64 {
        self.volume_cm3 * MM3_PER_CM3
    }
}

/// Volumes of every non-zero label present in `mask`, ascending by label value.
///
/// # Errors
///
/// [`EngineError::MissingData`] when the grid or mask is absent and
/// [`EngineError::MissingSpacing`] when the grid carries no voxel spacing.
pub fn compute_volumes(
    grid: Option<&VolumeGrid>,
    mask: &LabelMask,
    names: &LabelNames,
) -> Result<Vec<LabelVolume>> {
    let grid = grid.ok_or(EngineError::MissingData("no volume loaded"))?;
    let labels = mask
        .labels()
        .ok_or(EngineError::MissingData("no label mask loaded"))?;
    let spacing = grid.require_spacing()?;
    Ok(volumes_from_counts(label_counts(labels), spacing, names))
}

pub(crate) fn volumes_from_counts(
    counts: Vec<(u16, usize)>,
    spacing: Spacing,
    names: &LabelNames,
) -> Vec<LabelVolume> {
    let voxel_cm3 = spacing.voxel_volume_mm3() / MM3_PER_CM3;
    counts
        .into_iter()
        .filter(|&(label, _)| label != 0)
        .map(|(label, voxel_count)| LabelVolume {
            label,
            name: names.name_for(label),
            voxel_count,
            volume_cm3: voxel_count as f64 * voxel_cm3,
        })
        .collect()
}

/// Name-keyed view of the results. A name shared by several labels is suffixed with the
/// label value on every entry, e.g. `"Tumor [3]"`, so each label keeps its own key.
pub fn volumes_by_name(volumes: &[LabelVolume]) -> BTreeMap<String, f64> {
    let mut uses: BTreeMap<&str, usize> = BTreeMap::new();
    for volume in volumes {
        *uses.entry(volume.name.as_str()).or_default() += 1;
    }
    volumes
        .iter()
        .map(|v| {
            let key = if uses[v.name.as_str()] > 1 {
                format!("{} [{}]", v.name, v.label)
            } else {
                v.name.clone()
            };
            (key, v.volume_cm3)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Affine, Dims};

    fn grid(dims: Dims, spacing: Option<Spacing>) -> VolumeGrid {
        VolumeGrid::load(vec![0.0; dims.voxel_count()], dims, spacing, Affine::identity())
            .expect("grid")
    }

    #[test]
    fn eight_voxels_of_two_millimetres() {
        let dims = Dims::new(4, 4, 4);
        let grid = grid(dims, Some(Spacing::isotropic(2.0).expect("spacing")));
        let mut raw = vec![0u16; 64];
        raw[..8].fill(1);
        let mut mask = LabelMask::new();
        mask.load(raw, dims, dims).expect("mask");

        let volumes = compute_volumes(Some(&grid), &mask, &LabelNames::new()).expect("volumes");
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].label, 1);
        assert_eq!(volumes[0].voxel_count, 8);
        assert!((volumes[0].volume_cm3 - 0.064).abs() < 1e-12);
        assert!((volumes[0].volume_mm3() - 64.0).abs() < 1e-9);

        let by_name = volumes_by_name(&volumes);
        assert!(by_name.contains_key("Label_1 (UNMAPPED)"));
        assert!(!by_name.keys().any(|k| k.starts_with("Label_0")));
    }

    #[test]
    fn registered_names_are_used() {
        let dims = Dims::new(1, 2, 2);
        let grid = grid(dims, Some(Spacing::new(1.0, 1.0, 5.0).expect("spacing")));
        let mut mask = LabelMask::new();
        mask.load(vec![0, 3, 3, 4], dims, dims).expect("mask");
        let mut names = LabelNames::new();
        names.insert(3, "Tumor");

        let volumes = compute_volumes(Some(&grid), &mask, &names).expect("volumes");
        let by_name = volumes_by_name(&volumes);
        assert_eq!(by_name["Tumor"], 0.01);
        assert_eq!(by_name["Label_4 (UNMAPPED)"], 0.005);
    }

    #[test]
    fn shared_names_keep_one_entry_per_label() {
        let dims = Dims::new(1, 2, 2);
        let grid = grid(dims, Some(Spacing::default()));
        let mut mask = LabelMask::new();
        mask.load(vec![2, 3, 3, 5], dims, dims).expect("mask");
        let mut names = LabelNames::new();
        names.insert(2, "Tumor");
        names.insert(3, "Tumor");
        names.insert(5, "Edema");

        let volumes = compute_volumes(Some(&grid), &mask, &names).expect("volumes");
        let by_name = volumes_by_name(&volumes);
        assert_eq!(by_name.len(), 3);
        assert_eq!(by_name["Tumor [2]"], 0.001);
        assert_eq!(by_name["Tumor [3]"], 0.002);
        assert_eq!(by_name["Edema"], 0.001);
    }

    #[test]
    fn missing_inputs_are_reported() {
        let dims = Dims::new(1, 1, 1);
        let mask = LabelMask::new();
        let names = LabelNames::new();
        assert!(matches!(
            compute_volumes(None, &mask, &names),
            Err(EngineError::MissingData(_))
        ));
        let with_spacing = grid(dims, Some(Spacing::default()));
        assert!(matches!(
            compute_volumes(Some(&with_spacing), &mask, &names),
            Err(EngineError::MissingData(_))
        ));

        let without_spacing = grid(dims, None);
        let mut loaded = LabelMask::new();
        loaded.load(vec![1], dims, dims).expect("mask");
        assert!(matches!(
            compute_volumes(Some(&without_spacing), &loaded, &names),
            Err(EngineError::MissingSpacing)
        ));
    }

    #[test]
    fn repeated_runs_are_bit_identical() {
        let dims = Dims::new(3, 5, 7);
        let grid = grid(dims, Some(Spacing::new(0.37, 1.11, 2.9).expect("spacing")));
        let raw: Vec<u16> = (0..dims.voxel_count()).map(|i| (i % 5) as u16).collect();
        let mut mask = LabelMask::new();
        mask.load(raw, dims, dims).expect("mask");
        let names = LabelNames::new();
        let first = compute_volumes(Some(&grid), &mask, &names).expect("first");
        let second = compute_volumes(Some(&grid), &mask, &names).expect("second");
        let bits = |v: &[LabelVolume]| v.iter().map(|l| l.volume_cm3.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&first), bits(&second));
        assert_eq!(first.len(), 4);
    }
}
