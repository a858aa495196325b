//! 3D 邻域偏移量, 按 `(z, y, x)` 排列.

/// 距离为 1 的 13 个互不相反的方向.
pub(crate) const DIRECTIONS_13: [(isize, isize, isize); 13] = [
    (0, 0, 1),
    (0, 1, -1),
    (0, 1, 0),
    (0, 1, 1),
    (1, -1, -1),
    (1, -1, 0),
    (1, -1, 1),
    (1, 0, -1),
    (1, 0, 0),
    (1, 0, 1),
    (1, 1, -1),
    (1, 1, 0),
    (1, 1, 1),
];

/// 26 邻域.
pub(crate) fn neighbours_26() -> impl Iterator<Item = (isize, isize, isize)> {
    DIRECTIONS_13
        .into_iter()
        .flat_map(|(z, y, x)| [(z, y, x), (-z, -y, -x)])
}
