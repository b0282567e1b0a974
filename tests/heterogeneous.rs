mod util;
use util::*;

use bytemuck::{Pod, Zeroable};
use halo_grid::algs::communicator::{CommTag, Communicator};
use halo_grid::algs::p2p::{recv, send};
use halo_grid::layout::{HeterogeneousLayout, HeterogeneousParameter, Layout, make_absolute};

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
struct Cell {
    pressure: f64,
    velocity: [f32; 2],
    flags: u32,
    _pad: u32,
}

fn cell_layout(c: &Cell) -> HeterogeneousLayout {
    let mut par = HeterogeneousParameter::new();
    par.add_field(c, &c.pressure)
        .unwrap()
        .add_layout(8, &Layout::<f32>::contiguous(2).unwrap())
        .unwrap()
        .add_field(c, &c.flags)
        .unwrap();
    HeterogeneousLayout::heterogeneous(&par).unwrap()
}

#[test]
fn relative_record_crosses_ranks() {
    let got = run_ranks(2, |comm| {
        let tag = CommTag::new(0x4E7);
        let mut c = Cell::default();
        let l = cell_layout(&c);
        if comm.rank() == 0 {
            c = Cell { pressure: 2.5, velocity: [1.0, -1.0], flags: 3, _pad: 99 };
            send(comm, bytemuck::bytes_of(&c), &l, 1, tag).unwrap();
        } else {
            recv(comm, bytemuck::bytes_of_mut(&mut c), &l, 0, tag).unwrap();
        }
        c
    });
    assert_eq!(got[1], Cell { pressure: 2.5, velocity: [1.0, -1.0], flags: 3, _pad: 0 });
}

#[test]
fn extent_spans_all_members() {
    let c = Cell::default();
    let l = cell_layout(&c);
    assert_eq!(l.byte_size(), 20);
    assert_eq!(l.byte_lower_bound().unwrap(), 0);
    assert_eq!(l.byte_upper_bound().unwrap(), 20);
}

#[test]
fn absolute_layout_rejects_safe_pack() {
    let xs = [1u64, 2, 3];
    let mut par = HeterogeneousParameter::new();
    par.add_absolute(make_absolute(xs.as_ptr(), &Layout::contiguous(3).unwrap()).unwrap())
        .unwrap();
    let l = HeterogeneousLayout::heterogeneous(&par).unwrap();
    assert!(l.pack(&[0u8; 24]).is_err());
    let bytes = unsafe { l.pack_absolute() }.unwrap();
    assert_eq!(elems::<u64>(&bytes), vec![1, 2, 3]);
}

#[test]
fn null_member_is_rejected() {
    let mut par = HeterogeneousParameter::new();
    assert!(par.add_layout(0, &Layout::<u8>::null()).is_err());
    assert!(make_absolute(std::ptr::null::<u8>(), &Layout::null()).is_err());
}
