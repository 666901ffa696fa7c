use super::*;

#[test]
fn halving_the_rate_skips_every_other_frame() {
    let plan = ResamplePlan::new(10, 10.0, Some(5.0)).unwrap();
    assert_eq!(plan.repeats(), &[1, 0, 1, 0, 1, 0, 1, 0, 1, 0]);
    assert_eq!(plan.total_out(), 5);
    assert_eq!(plan.contributing_count(), 5);
}

#[test]
fn upsampling_two_frames_to_five() {
    let plan = ResamplePlan::new(2, 2.0, Some(5.0)).unwrap();
    assert_eq!(plan.repeats(), &[3, 2]);
    assert_eq!(plan.total_out(), 5);
}

#[test]
fn identity_rate_repeats_every_frame_once() {
    let plan = ResamplePlan::new(7, 30.0, None).unwrap();
    assert_eq!(plan.output_fps(), 30);
    assert!(plan.repeats().iter().all(|r| *r == 1));
    assert_eq!(plan.total_out(), 7);
}

#[test]
fn default_rate_rounds_fractional_source_rate() {
    let plan = ResamplePlan::new(60, 29.97, None).unwrap();
    assert_eq!(plan.output_fps(), 30);
    assert_eq!(plan.total_out(), (60.0 / 29.97 * 30.0f64).round() as u64);
}

#[test]
fn requested_rate_is_clamped() {
    assert_eq!(ResamplePlan::new(1, 30.0, Some(0.2)).unwrap().output_fps(), 1);
    assert_eq!(ResamplePlan::new(1, 30.0, Some(1000.0)).unwrap().output_fps(), 240);
    assert_eq!(normalize_output_fps(f64::NAN), MIN_OUTPUT_FPS);
    assert_eq!(normalize_output_fps(-3.0), MIN_OUTPUT_FPS);
}

#[test]
fn invalid_source_is_rejected() {
    assert!(matches!(
        ResamplePlan::new(0, 30.0, None),
        Err(ReelError::InvalidAnimation(_))
    ));
    assert!(matches!(
        ResamplePlan::new(10, 0.0, None),
        Err(ReelError::InvalidAnimation(_))
    ));
    assert!(matches!(
        ResamplePlan::new(10, f64::INFINITY, None),
        Err(ReelError::InvalidAnimation(_))
    ));
}

#[test]
fn repeats_sum_to_total_out_across_rates() {
    for n_src in [1u64, 2, 3, 7, 24, 59, 60, 61, 150, 301] {
        for src_fps in [1.0, 12.0, 23.976, 24.0, 25.0, 29.97, 30.0, 50.0, 60.0, 120.0] {
            for fps in [1.0, 5.0, 15.0, 24.0, 25.0, 30.0, 48.0, 60.0, 144.0, 240.0] {
                let plan = ResamplePlan::new(n_src, src_fps, Some(fps)).unwrap();
                let sum: u64 = plan.repeats().iter().map(|r| u64::from(*r)).sum();
                let expected = (n_src as f64 / src_fps * fps).round() as u64;
                assert_eq!(sum, plan.total_out(), "n={n_src} src={src_fps} fps={fps}");
                assert!(
                    sum.abs_diff(expected) <= 1,
                    "n={n_src} src={src_fps} fps={fps}: {sum} vs {expected}"
                );
                assert_eq!(plan.source_frames(), n_src);
            }
        }
    }
}

#[test]
fn downsampling_always_skips_some_frame() {
    for (n_src, src_fps, fps) in [(10u64, 30.0, 24.0), (60, 60.0, 30.0), (100, 25.0, 24.0)] {
        let plan = ResamplePlan::new(n_src, src_fps, Some(fps)).unwrap();
        assert!(plan.repeats().contains(&0), "{n_src} {src_fps} {fps}");
        assert!(plan.contributing_count() < n_src as usize);
    }
}

#[test]
fn upsampling_repeats_every_frame_at_least_twice() {
    let plan = ResamplePlan::new(12, 12.0, Some(30.0)).unwrap();
    assert!(plan.repeats().iter().all(|r| *r >= 2));
    assert_eq!(plan.total_out(), 30);
}

#[test]
fn contributing_cursor_walks_nonzero_indices() {
    let plan = ResamplePlan::new(10, 10.0, Some(5.0)).unwrap();
    assert_eq!(plan.first_contributing(), Some(FrameIndex(0)));
    assert_eq!(plan.next_contributing(FrameIndex(0)), Some(FrameIndex(2)));
    assert_eq!(plan.next_contributing(FrameIndex(1)), Some(FrameIndex(2)));
    assert_eq!(plan.next_contributing(FrameIndex(8)), None);
    let listed: Vec<u64> = plan.contributing().map(|f| f.0).collect();
    assert_eq!(listed, vec![0, 2, 4, 6, 8]);
    assert_eq!(plan.repeat(FrameIndex(99)), 0);
}

#[test]
fn very_short_animation_at_low_rate_may_have_no_output() {
    // 1 frame at 60fps resampled to 1fps rounds to zero output frames.
    let plan = ResamplePlan::new(1, 60.0, Some(1.0)).unwrap();
    assert_eq!(plan.total_out(), 0);
    assert_eq!(plan.first_contributing(), None);
}

#[test]
fn oversized_plans_are_rejected_instead_of_allocated() {
    let err = ResamplePlan::new(MAX_SOURCE_FRAMES + 1, 30.0, None).unwrap_err();
    assert!(matches!(err, ReelError::InvalidAnimation(_)), "{err}");
    assert!(ResamplePlan::new(u64::MAX, 30.0, None).is_err());

    // A near-zero source rate stretches one frame over ~30 years of output.
    let err = ResamplePlan::new(1, 1e-9, None).unwrap_err();
    assert!(matches!(err, ReelError::InvalidAnimation(_)), "{err}");
}

#[test]
fn slow_source_rate_keeps_repeat_sum_exact() {
    let plan = ResamplePlan::new(2, 1.0 / 1024.0, Some(1.0)).unwrap();
    assert_eq!(plan.total_out(), 2048);
    assert_eq!(plan.repeats(), &[1024, 1024]);
    assert_eq!(
        plan.repeats().iter().map(|r| u64::from(*r)).sum::<u64>(),
        plan.total_out()
    );
}
