mod util;
use util::*;

use halo_grid::datatype::ArrayOrder;
use halo_grid::grid_error::GridError;
use halo_grid::layout::{IndexedBlockParameter, IndexedParameter, Layout, LayoutKind, SubarrayParameter};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn pack<T: bytemuck::Pod>(l: &Layout<T>, data: &[T]) -> Vec<T> {
    elems(&l.pack(data).unwrap())
}

#[test]
fn vector_and_contiguous_describe_the_same_bytes() {
    let c = Layout::<u64>::contiguous(5).unwrap();
    let v = Layout::<u64>::vector(5).unwrap();
    assert_eq!(c.type_map().unwrap(), v.type_map().unwrap());
    assert_eq!(c.kind(), &LayoutKind::Contiguous { count: 5 });
    assert_eq!(v.kind(), &LayoutKind::Vector { count: 5 });
}

#[test]
fn strided_vector_bounds() {
    let l = Layout::<i32>::strided_vector(3, 2, 4).unwrap();
    assert_eq!(l.size(), 6);
    assert_eq!(l.lower_bound().unwrap(), 0);
    assert_eq!(l.extent().unwrap(), 10);
    assert_eq!(l.upper_bound().unwrap(), 10);
    assert_eq!(l.true_extent().unwrap(), 10);
    let data: Vec<i32> = (0..12).collect();
    assert_eq!(pack(&l, &data), vec![0, 1, 4, 5, 8, 9]);
}

#[test]
fn negative_stride_walks_backwards() {
    let l = Layout::<i32>::strided_vector(3, 1, -2).unwrap();
    assert_eq!(l.lower_bound().unwrap(), -4);
    let data: Vec<i32> = (0..6).collect();
    assert_eq!(elems::<i32>(&l.pack_at(&data, 16).unwrap()), vec![4, 2, 0]);
}

#[test]
fn indexed_blocks_may_overlap_and_be_unsorted() {
    let par = IndexedParameter::from_parts(vec![3, 2], vec![4, 0]).unwrap();
    let l = Layout::<u8>::indexed(&par).unwrap();
    assert_eq!(pack(&l, &[0, 1, 2, 3, 4, 5, 6]), vec![4, 5, 6, 0, 1]);
    let overlapping: IndexedParameter = [(3, 0), (3, 1)].into_iter().collect();
    let l = Layout::<u8>::indexed(&overlapping).unwrap();
    assert_eq!(pack(&l, &[7, 8, 9, 10]), vec![7, 8, 9, 8, 9, 10]);
}

#[test]
fn indexed_block_matches_indexed() {
    let disps = [5isize, 1, 9];
    let a = Layout::<f32>::indexed_block(2, &disps.iter().copied().collect::<IndexedBlockParameter>()).unwrap();
    let b = Layout::<f32>::indexed(&disps.iter().map(|&d| (2, d)).collect()).unwrap();
    assert_eq!(a.type_map().unwrap(), b.type_map().unwrap());
}

#[test]
fn subarray_orders_agree_with_reversed_dimensions() {
    let mut rng = SmallRng::seed_from_u64(17);
    let data: Vec<u32> = (0..60).map(|_| rng.gen_range(0..1000)).collect();
    // 3 x 4 x 5 array, C order: last index fastest
    let mut c = SubarrayParameter::new();
    c.add(3, 2, 1).add(4, 3, 0).add(5, 2, 2);
    let mut f = SubarrayParameter::new();
    f.add(5, 2, 2).add(4, 3, 0).add(3, 2, 1).set_order(ArrayOrder::Fortran);
    let lc = Layout::subarray(&c).unwrap();
    let lf = Layout::subarray(&f).unwrap();
    assert_eq!(pack(&lc, &data), pack(&lf, &data));
    assert_eq!(lc.extent().unwrap(), 60);
    assert_eq!(lc.size(), 12);
}

#[test]
fn subarray_rejects_mismatched_or_out_of_range_boxes() {
    let mut p = SubarrayParameter::new();
    p.add(4, 3, 2);
    assert!(matches!(Layout::<u8>::subarray(&p), Err(GridError::InvalidLayout(_))));
}

#[test]
fn resized_layout_repeats_with_hole() {
    // second of every three elements
    let par: IndexedParameter = [(1, 1)].into_iter().collect();
    let mut l = Layout::<i64>::indexed(&par).unwrap();
    l.resize(0, 3).unwrap();
    let rep = Layout::strided_vector_of(4, 1, 1, &l).unwrap();
    let data: Vec<i64> = (0..12).collect();
    assert_eq!(pack(&rep, &data), vec![1, 4, 7, 10]);
    assert_eq!(rep.extent().unwrap(), 12);
}

#[test]
fn byte_resize_reports_element_bound_errors() {
    let mut l = Layout::<u32>::contiguous(2).unwrap();
    l.byte_resize(-2, 10).unwrap();
    assert_eq!(l.byte_lower_bound().unwrap(), -2);
    assert_eq!(l.byte_upper_bound().unwrap(), 8);
    assert!(matches!(l.lower_bound(), Err(GridError::InvalidDatatypeBound { .. })));
    assert_eq!(l.true_byte_lower_bound().unwrap(), 0);
}

#[test]
fn unpack_checks_buffer_bounds() {
    let l = Layout::<u16>::strided_vector(2, 1, 3).unwrap();
    let mut small = [0u16; 3];
    let err = l.unpack(&[0u8; 4], &mut small).unwrap_err();
    assert!(matches!(err, GridError::BufferOutOfBounds { .. }));
    let mut ok = [0u16; 4];
    l.unpack(bytemuck::cast_slice(&[5u16, 6]), &mut ok).unwrap();
    assert_eq!(ok, [5, 0, 0, 6]);
}
