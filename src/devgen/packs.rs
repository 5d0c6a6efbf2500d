//! Argument pack planner.
//!
//! One left-to-right pass: consecutive scalars collapse into one pack,
//! every array and vector gets its own pack. The layout step then places
//! each pack either in the envelope payload (at a cumulative offset) or
//! in a buffer reloaded from the stream after the first vector (offset 0).

use super::descriptor::{ArgCategory, ArgKind, ArgumentDescriptor};

/// Size of the element count that precedes vector data.
pub const VECTOR_COUNT_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackFamily {
    Scalar,
    Array,
    Vector,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pack {
    pub family: PackFamily,
    /// Argument indices, in order
    pub members: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PackPlan {
    pub packs: Vec<Pack>,
    pub has_vector: bool,
}

pub fn plan_categories(categories: &[ArgCategory]) -> PackPlan {
    let mut plan = PackPlan::default();
    let mut pending: Vec<usize> = Vec::new();

    for (idx, category) in categories.iter().enumerate() {
        let family = match category {
            ArgCategory::Scalar => {
                pending.push(idx);
                continue;
            }
            ArgCategory::FixedArray => PackFamily::Array,
            ArgCategory::Vector => {
                plan.has_vector = true;
                PackFamily::Vector
            }
        };
        if !pending.is_empty() {
            plan.packs.push(Pack {
                family: PackFamily::Scalar,
                members: std::mem::take(&mut pending),
            });
        }
        plan.packs.push(Pack {
            family,
            members: vec![idx],
        });
    }

    if !pending.is_empty() {
        plan.packs.push(Pack {
            family: PackFamily::Scalar,
            members: pending,
        });
    }
    plan
}

pub fn plan_packs(args: &[ArgumentDescriptor]) -> PackPlan {
    let categories: Vec<ArgCategory> = args.iter().map(|a| a.category()).collect();
    plan_categories(&categories)
}

/// Where a pack's bytes come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// Inside the envelope payload
    Envelope { offset: usize },
    /// A fresh buffer of `size` bytes read after the vector data
    Reload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackLayout {
    pub family: PackFamily,
    pub members: Vec<usize>,
    pub region: Region,
    /// Wire size; for vectors the size of the element count
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationLayout {
    pub packs: Vec<PackLayout>,
    pub has_vector: bool,
    /// Exact envelope payload size
    pub payload_size: usize,
}

/// Wire size of one argument inside a pack.
pub fn wire_size(kind: &ArgKind) -> usize {
    match *kind {
        ArgKind::Scalar(ty) => ty.width(),
        ArgKind::FixedArray { elem, len } => elem.width() * len,
        ArgKind::Vector(_) => VECTOR_COUNT_SIZE,
    }
}

pub fn layout(args: &[ArgumentDescriptor]) -> OperationLayout {
    let plan = plan_packs(args);
    let mut offset = 0;
    let mut after_vector = false;
    let mut packs = Vec::with_capacity(plan.packs.len());

    for pack in plan.packs {
        let size: usize = pack.members.iter().map(|&i| wire_size(&args[i].kind)).sum();
        let region = if after_vector {
            Region::Reload
        } else {
            let region = Region::Envelope { offset };
            offset += size;
            region
        };
        if pack.family == PackFamily::Vector {
            after_vector = true;
        }
        packs.push(PackLayout {
            family: pack.family,
            members: pack.members,
            region,
            size,
        });
    }

    OperationLayout {
        packs,
        has_vector: plan.has_vector,
        payload_size: offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::ScalarType;
    use proptest::prelude::*;

    fn arg(kind: ArgKind) -> ArgumentDescriptor {
        ArgumentDescriptor {
            name: "x".into(),
            ty: String::new(),
            by_reference: false,
            is_const: false,
            kind,
        }
    }

    fn families(plan: &PackPlan) -> Vec<PackFamily> {
        plan.packs.iter().map(|p| p.family).collect()
    }

    #[test]
    fn test_consecutive_scalars_one_pack() {
        use ArgCategory::*;
        let plan = plan_categories(&[Scalar, Scalar, Scalar]);
        assert_eq!(plan.packs.len(), 1);
        assert_eq!(plan.packs[0].members, vec![0, 1, 2]);
        assert!(!plan.has_vector);
    }

    #[test]
    fn test_array_splits_scalars() {
        use ArgCategory::*;
        let plan = plan_categories(&[Scalar, FixedArray, Scalar]);
        assert_eq!(
            families(&plan),
            vec![PackFamily::Scalar, PackFamily::Array, PackFamily::Scalar]
        );
    }

    #[test]
    fn test_empty_arguments() {
        let plan = plan_categories(&[]);
        assert!(plan.packs.is_empty());
        assert_eq!(layout(&[]).payload_size, 0);
    }

    #[test]
    fn test_layout_offsets() {
        let args = vec![
            arg(ArgKind::Scalar(ScalarType::U32)),
            arg(ArgKind::Scalar(ScalarType::Bool)),
            arg(ArgKind::FixedArray {
                elem: ScalarType::F32,
                len: 3,
            }),
            arg(ArgKind::Scalar(ScalarType::F64)),
        ];
        let layout = layout(&args);
        let regions: Vec<Region> = layout.packs.iter().map(|p| p.region).collect();
        assert_eq!(
            regions,
            vec![
                Region::Envelope { offset: 0 },
                Region::Envelope { offset: 5 },
                Region::Envelope { offset: 17 }
            ]
        );
        assert_eq!(layout.payload_size, 25);
    }

    #[test]
    fn test_vector_starts_reload_region() {
        let args = vec![
            arg(ArgKind::Scalar(ScalarType::U32)),
            arg(ArgKind::Vector(ScalarType::U32)),
            arg(ArgKind::Scalar(ScalarType::U16)),
            arg(ArgKind::FixedArray {
                elem: ScalarType::U8,
                len: 4,
            }),
        ];
        let layout = layout(&args);
        assert!(layout.has_vector);
        assert_eq!(layout.payload_size, 4 + VECTOR_COUNT_SIZE);
        assert_eq!(layout.packs[1].region, Region::Envelope { offset: 4 });
        assert_eq!(layout.packs[2].region, Region::Reload);
        assert_eq!(layout.packs[2].size, 2);
        assert_eq!(layout.packs[3].region, Region::Reload);
        assert_eq!(layout.packs[3].size, 4);
    }

    fn category() -> impl Strategy<Value = ArgCategory> {
        prop_oneof![
            Just(ArgCategory::Scalar),
            Just(ArgCategory::FixedArray),
            Just(ArgCategory::Vector),
        ]
    }

    fn kind_for(category: ArgCategory) -> ArgKind {
        match category {
            ArgCategory::Scalar => ArgKind::Scalar(ScalarType::U32),
            ArgCategory::FixedArray => ArgKind::FixedArray {
                elem: ScalarType::U16,
                len: 2,
            },
            ArgCategory::Vector => ArgKind::Vector(ScalarType::F32),
        }
    }

    proptest! {
        #[test]
        fn prop_plan_preserves_order(categories in prop::collection::vec(category(), 0..12)) {
            let plan = plan_categories(&categories);
            let flattened: Vec<usize> = plan.packs.iter().flat_map(|p| p.members.clone()).collect();
            prop_assert_eq!(flattened, (0..categories.len()).collect::<Vec<_>>());
            prop_assert_eq!(plan.has_vector, categories.contains(&ArgCategory::Vector));

            for pair in plan.packs.windows(2) {
                // Two scalar packs are never adjacent
                prop_assert!(!(pair[0].family == PackFamily::Scalar && pair[1].family == PackFamily::Scalar));
            }
            for pack in &plan.packs {
                if pack.family != PackFamily::Scalar {
                    prop_assert_eq!(pack.members.len(), 1);
                }
            }
        }

        #[test]
        fn prop_single_vector_splits_regions(
            before in prop::collection::vec(prop_oneof![Just(ArgCategory::Scalar), Just(ArgCategory::FixedArray)], 0..6),
            after in prop::collection::vec(prop_oneof![Just(ArgCategory::Scalar), Just(ArgCategory::FixedArray)], 0..6),
        ) {
            let mut categories = before.clone();
            categories.push(ArgCategory::Vector);
            categories.extend(after.iter().copied());
            let args: Vec<ArgumentDescriptor> = categories.iter().map(|&c| arg(kind_for(c))).collect();

            let layout = layout(&args);
            let vector_pack = layout.packs.iter().position(|p| p.family == PackFamily::Vector).unwrap();

            let mut expected_offset = 0;
            for pack in &layout.packs[..=vector_pack] {
                prop_assert_eq!(pack.region, Region::Envelope { offset: expected_offset });
                expected_offset += pack.size;
            }
            for pack in &layout.packs[vector_pack + 1..] {
                prop_assert_eq!(pack.region, Region::Reload);
            }
            prop_assert_eq!(layout.payload_size, expected_offset);
        }
    }
}
