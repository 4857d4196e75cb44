//! Assertion helpers for tests.

use pretty_assertions::assert_eq;

use halftone::halftone::HalftoneContext;
use halftone::order::CellOrder;

/// Assert the structural invariants every finished order must keep
pub fn assert_valid_order(order: &CellOrder) {
    let levels = order.levels();
    assert_eq!(levels.len() as u32, order.num_levels());
    assert!(
        levels.windows(2).all(|w| w[0] <= w[1]),
        "levels must be non-decreasing: {levels:?}"
    );
    assert!(
        levels.last().copied().unwrap_or(0) <= order.num_bits(),
        "last level {:?} exceeds {} bits",
        levels.last(),
        order.num_bits()
    );
    order.validate().expect("order validates");
}

/// Pixels painted for input `v` over one full (shift-expanded) cell.
pub fn cell_pixels(ctx: &HalftoneContext, component: usize, v: u8) -> Vec<bool> {
    let set = ctx.halftone().expect("installed halftone");
    let order = set.component(component).expect("component");
    let (width, height) = (order.width(), order.full_height());
    ctx.with_tile(component, v, |_, tile| {
        (0..height as u64)
            .flat_map(|y| (0..width as u64).map(move |x| tile.sample(x, y)))
            .collect()
    })
    .expect("tile")
}

/// Assert two contexts paint identical pixels for every component and
/// every input level.
pub fn assert_same_pixels(a: &HalftoneContext, b: &HalftoneContext) {
    let components = a.halftone().expect("installed halftone").num_components();
    assert_eq!(
        components,
        b.halftone().expect("installed halftone").num_components()
    );
    for component in 0..components {
        for v in 0..=255u8 {
            assert_eq!(
                cell_pixels(a, component, v),
                cell_pixels(b, component, v),
                "component {component} input {v}"
            );
        }
    }
}
