//! # geo：WGS-84 几何工具
//!
//! 路径控制与起点规则需要在大地坐标与本地 ENU 米制之间往返。这里采用曲率半径
//! 近似：对机载控制涉及的千米级位移，误差远小于导航估计本身的不确定度。
//! 角度一律为弧度。

use std::f64::consts::{PI, TAU};

/// 本地 ENU 平面上的北/东位移（米）。
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Enu {
    pub north: f64,
    pub east: f64,
}

impl Enu {
    pub fn new(north: f64, east: f64) -> Self {
        Enu { north, east }
    }

    /// 指向 `other` 的（方位角, 距离）。
    pub fn bearing_range_to(&self, other: Enu) -> (f64, f64) {
        bearing_and_range(other.north - self.north, other.east - self.east)
    }
}

/// WGS-84 长半轴（米）。
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS-84 扁率。
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;

fn ecc_sq() -> f64 {
    WGS84_F * (2.0 - WGS84_F)
}

/// 子午圈曲率半径。
pub fn meridional_radius(lat: f64) -> f64 {
    let e2 = ecc_sq();
    let s = lat.sin();
    WGS84_A * (1.0 - e2) / (1.0 - e2 * s * s).powf(1.5)
}

/// 卯酉圈曲率半径。
pub fn normal_radius(lat: f64) -> f64 {
    let e2 = ecc_sq();
    let s = lat.sin();
    WGS84_A / (1.0 - e2 * s * s).sqrt()
}

/// 把角度归一到 (-π, π]。
pub fn normalize_angle(angle: f64) -> f64 {
    let mut a = angle % TAU;
    if a <= -PI {
        a += TAU;
    } else if a > PI {
        a -= TAU;
    }
    a
}

/// 两个大地坐标点之间的北/东位移（米），在中点纬度取曲率。
pub fn displacement(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> (f64, f64) {
    let lat_m = 0.5 * (lat1 + lat2);
    let north = (lat2 - lat1) * meridional_radius(lat_m);
    let east = (lon2 - lon1) * normal_radius(lat_m) * lat_m.cos();
    (north, east)
}

/// 从大地坐标点出发按北/东位移（米）前推新的大地坐标。
pub fn displace(lat: f64, lon: f64, north: f64, east: f64) -> (f64, f64) {
    let lat2 = lat + north / meridional_radius(lat);
    let lon2 = lon + east / (normal_radius(lat) * lat.cos());
    (lat2, lon2)
}

/// 北/东位移向量的方位角与模长。方位角以正北为零、向东为正。
pub fn bearing_and_range(north: f64, east: f64) -> (f64, f64) {
    (east.atan2(north), north.hypot(east))
}
