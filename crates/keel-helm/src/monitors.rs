//! # monitors：航迹偏差监视器
//!
//! ## 设计背景（Why）
//! - 路径跟随失效必须在有界时间内被发现并升级为实体错误，而不是无限期漂走；
//! - 两个监视器都是带滞回的三值小状态机 {nominal, diverging, error}，
//!   短暂扰动先进入 diverging，持续不恢复才判错。
//!
//! ## 行为契约（What）
//! - 纵向（along-track）：每 `period` 秒核对一次进度。|航向误差| < π/2 时进度
//!   取航迹纵坐标增量、期望为 `period × min_speed`；否则取 |航向误差| 的收敛
//!   量、期望为 `period × min_yaw`。连续两个检查期不达标即判错；
//! - 横向（cross-track）：|y| 越过 `distance_limit`（可按导航不确定度
//!   √max(pos var) 放宽）进入 diverging 并起表，`time_limit` 秒内未回到带内
//!   即判错；回带即复位；
//! - 刹车期间两者都不评估，盘旋期间纵向不评估——由调用方负责门控。

use std::f64::consts::FRAC_PI_2;

/// 监视器单步结论。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MonitorVerdict {
    Nominal,
    Diverging,
    /// 持续偏离，应升级为实体错误并停止跟随。
    Diverged,
}

/// 纵向监视器配置。
#[derive(Clone, Copy, Debug)]
pub struct AlongTrackArgs {
    pub period: f64,
    pub min_speed: f64,
    pub min_yaw: f64,
}

impl Default for AlongTrackArgs {
    fn default() -> Self {
        AlongTrackArgs {
            period: 20.0,
            min_speed: 0.1,
            min_yaw: 0.094,
        }
    }
}

/// 纵向进度监视器。
#[derive(Clone, Debug)]
pub struct AlongTrackMonitor {
    args: AlongTrackArgs,
    last_check: f64,
    last_x: f64,
    last_course_error: f64,
    diverging: bool,
}

impl AlongTrackMonitor {
    pub fn new(args: AlongTrackArgs) -> Self {
        AlongTrackMonitor {
            args,
            last_check: 0.0,
            last_x: 0.0,
            last_course_error: 0.0,
            diverging: false,
        }
    }

    pub fn update_args(&mut self, args: AlongTrackArgs) {
        self.args = args;
    }

    /// 新航迹起步：以当前量测为进度基准。
    pub fn reset(&mut self, now: f64, x: f64, course_error: f64) {
        self.last_check = now;
        self.last_x = x;
        self.last_course_error = course_error;
        self.diverging = false;
    }

    /// 周期核对；检查期未满时维持上一结论。
    pub fn check(&mut self, now: f64, x: f64, course_error: f64) -> MonitorVerdict {
        if now - self.last_check < self.args.period {
            return if self.diverging {
                MonitorVerdict::Diverging
            } else {
                MonitorVerdict::Nominal
            };
        }
        let (progress, expected) = if course_error.abs() < FRAC_PI_2 {
            (x - self.last_x, self.args.period * self.args.min_speed)
        } else {
            // 航向背离航迹时，先要求航向误差在收敛。
            (
                self.last_course_error.abs() - course_error.abs(),
                self.args.period * self.args.min_yaw,
            )
        };
        self.last_check = now;
        self.last_x = x;
        self.last_course_error = course_error;

        if progress < expected {
            if self.diverging {
                return MonitorVerdict::Diverged;
            }
            self.diverging = true;
            return MonitorVerdict::Diverging;
        }
        self.diverging = false;
        MonitorVerdict::Nominal
    }
}

/// 横向监视器配置。`nav_uncertainty_factor` 为 0 时不做不确定度放宽。
#[derive(Clone, Copy, Debug)]
pub struct CrossTrackArgs {
    pub distance_limit: f64,
    pub time_limit: f64,
    pub nav_uncertainty_factor: f64,
}

impl Default for CrossTrackArgs {
    fn default() -> Self {
        CrossTrackArgs {
            distance_limit: 25.0,
            time_limit: 20.0,
            nav_uncertainty_factor: 0.0,
        }
    }
}

/// 横向偏距监视器。
#[derive(Clone, Debug)]
pub struct CrossTrackMonitor {
    args: CrossTrackArgs,
    diverging_since: Option<f64>,
}

impl CrossTrackMonitor {
    pub fn new(args: CrossTrackArgs) -> Self {
        CrossTrackMonitor {
            args,
            diverging_since: None,
        }
    }

    pub fn update_args(&mut self, args: CrossTrackArgs) {
        self.args = args;
    }

    pub fn reset(&mut self) {
        self.diverging_since = None;
    }

    /// `pos_variance`：导航位置方差的最大分量（估计器未提供时传 `None`）。
    pub fn check(&mut self, now: f64, y: f64, pos_variance: Option<f64>) -> MonitorVerdict {
        let mut limit = self.args.distance_limit;
        if self.args.nav_uncertainty_factor > 0.0 {
            if let Some(variance) = pos_variance {
                limit += self.args.nav_uncertainty_factor * variance.max(0.0).sqrt();
            }
        }
        if y.abs() >= limit {
            match self.diverging_since {
                None => {
                    self.diverging_since = Some(now);
                    MonitorVerdict::Diverging
                }
                Some(since) if now - since >= self.args.time_limit => MonitorVerdict::Diverged,
                Some(_) => MonitorVerdict::Diverging,
            }
        } else {
            self.diverging_since = None;
            MonitorVerdict::Nominal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn along_track_needs_two_consecutive_breaches() {
        let mut monitor = AlongTrackMonitor::new(AlongTrackArgs {
            period: 15.0,
            min_speed: 0.25,
            min_yaw: 0.094,
        });
        monitor.reset(0.0, 0.0, 0.0);
        // 期内不评估。
        assert_eq!(monitor.check(10.0, 0.0, 0.0), MonitorVerdict::Nominal);
        assert_eq!(monitor.check(15.0, 0.0, 0.0), MonitorVerdict::Diverging);
        // 第二个检查期仍无进度。
        assert_eq!(monitor.check(30.0, 0.0, 0.0), MonitorVerdict::Diverged);
    }

    #[test]
    fn along_track_recovers_on_progress() {
        let mut monitor = AlongTrackMonitor::new(AlongTrackArgs {
            period: 10.0,
            min_speed: 0.25,
            min_yaw: 0.094,
        });
        monitor.reset(0.0, 0.0, 0.0);
        assert_eq!(monitor.check(10.0, 0.5, 0.0), MonitorVerdict::Diverging);
        assert_eq!(monitor.check(20.0, 5.5, 0.0), MonitorVerdict::Nominal);
    }

    #[test]
    fn along_track_uses_yaw_convergence_when_pointed_away() {
        let mut monitor = AlongTrackMonitor::new(AlongTrackArgs {
            period: 10.0,
            min_speed: 0.25,
            min_yaw: 0.05,
        });
        monitor.reset(0.0, 0.0, 3.0);
        // 航向误差从 3.0 收敛到 2.0：进度 1.0 ≥ 0.5。
        assert_eq!(monitor.check(10.0, 0.0, 2.0), MonitorVerdict::Nominal);
        // 不再收敛则偏离。
        assert_eq!(monitor.check(20.0, 0.0, 2.0), MonitorVerdict::Diverging);
    }

    #[test]
    fn cross_track_times_out_outside_band() {
        let mut monitor = CrossTrackMonitor::new(CrossTrackArgs {
            distance_limit: 10.0,
            time_limit: 5.0,
            nav_uncertainty_factor: 0.0,
        });
        assert_eq!(monitor.check(0.0, 12.0, None), MonitorVerdict::Diverging);
        assert_eq!(monitor.check(3.0, 12.0, None), MonitorVerdict::Diverging);
        assert_eq!(monitor.check(5.0, 12.0, None), MonitorVerdict::Diverged);
    }

    #[test]
    fn cross_track_recovers_inside_band() {
        let mut monitor = CrossTrackMonitor::new(CrossTrackArgs {
            distance_limit: 10.0,
            time_limit: 5.0,
            nav_uncertainty_factor: 0.0,
        });
        assert_eq!(monitor.check(0.0, 12.0, None), MonitorVerdict::Diverging);
        assert_eq!(monitor.check(2.0, 8.0, None), MonitorVerdict::Nominal);
        // 重新出带要重新起表。
        assert_eq!(monitor.check(3.0, 12.0, None), MonitorVerdict::Diverging);
        assert_eq!(monitor.check(7.0, 12.0, None), MonitorVerdict::Diverging);
    }

    #[test]
    fn cross_track_band_widens_with_uncertainty() {
        let mut monitor = CrossTrackMonitor::new(CrossTrackArgs {
            distance_limit: 10.0,
            time_limit: 5.0,
            nav_uncertainty_factor: 2.0,
        });
        // limit = 10 + 2·√4 = 14。
        assert_eq!(monitor.check(0.0, 12.0, Some(4.0)), MonitorVerdict::Nominal);
        assert_eq!(
            monitor.check(1.0, 15.0, Some(4.0)),
            MonitorVerdict::Diverging
        );
    }
}
