use super::*;

#[test]
fn parses_standard_lottie_metadata() {
    let d = AnimationDescriptor::from_json_str(
        r#"{"v":"5.7.4","fr":30,"ip":0,"op":90,"w":512,"h":256,"layers":[]}"#,
    )
    .unwrap();
    assert_eq!(d.frame_rate(), 30.0);
    assert_eq!(d.frame_count(), 90);
    assert_eq!(
        d.native_size(),
        Some(Canvas {
            width: 512,
            height: 256
        })
    );
    assert!((d.duration_secs() - 3.0).abs() < 1e-9);
}

#[test]
fn fractional_out_point_rounds_frame_count_up() {
    let d = AnimationDescriptor::from_json_str(r#"{"fr":25,"ip":10,"op":20.5,"w":2,"h":2}"#)
        .unwrap();
    assert_eq!(d.frame_count(), 11);
}

#[test]
fn total_frames_and_fps_aliases_are_accepted() {
    let d = AnimationDescriptor::from_json_str(r#"{"fps":12,"totalFrames":24}"#).unwrap();
    assert_eq!(d.frame_rate(), 12.0);
    assert_eq!(d.frame_count(), 24);
    assert_eq!(d.native_size(), None);
}

#[test]
fn missing_or_bad_rate_is_invalid_animation() {
    for json in [
        r#"{"ip":0,"op":10,"w":2,"h":2}"#,
        r#"{"fr":0,"ip":0,"op":10}"#,
        r#"{"fr":-5,"ip":0,"op":10}"#,
    ] {
        let err = AnimationDescriptor::from_json_str(json).unwrap_err();
        assert!(matches!(err, ReelError::InvalidAnimation(_)), "{json}: {err}");
    }
}

#[test]
fn empty_or_malformed_payload_is_invalid_animation() {
    for json in [
        r#"{"fr":30,"ip":5,"op":5}"#,
        r#"{"fr":30,"ip":0}"#,
        "[1,2,3]",
        "not json",
    ] {
        let err = AnimationDescriptor::from_json_str(json).unwrap_err();
        assert!(matches!(err, ReelError::InvalidAnimation(_)), "{json}: {err}");
    }
}

#[test]
fn output_canvas_prefers_overrides_and_requires_a_size() {
    let d = AnimationDescriptor::from_json_str(r#"{"fr":30,"op":1,"w":100,"h":50}"#).unwrap();
    assert_eq!(
        d.output_canvas(Some(64), None).unwrap(),
        Canvas {
            width: 64,
            height: 50
        }
    );

    let sizeless = AnimationDescriptor::from_json_str(r#"{"fr":30,"op":1}"#).unwrap();
    assert!(matches!(
        sizeless.output_canvas(None, None),
        Err(ReelError::InvalidAnimation(_))
    ));
    assert!(sizeless.output_canvas(Some(8), Some(8)).is_ok());
}

#[test]
fn load_from_json_value_and_file() {
    let value = serde_json::json!({"fr": 24, "ip": 0, "op": 48, "w": 10, "h": 10});
    let d = AnimationDescriptor::load(AnimationSource::Json(value)).unwrap();
    assert_eq!(d.frame_count(), 48);

    let dir = std::path::PathBuf::from("target").join("descriptor_unit");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("anim.json");
    std::fs::write(&path, r#"{"fr":24,"ip":0,"op":12,"w":4,"h":4}"#).unwrap();
    let d = AnimationDescriptor::load(AnimationSource::Path(path)).unwrap();
    assert_eq!(d.frame_count(), 12);
    assert!(d.data().contains("\"op\":12"));
}

#[test]
fn oversized_metadata_is_invalid_animation() {
    for json in [
        r#"{"fr":30,"ip":0,"op":1e30,"w":2,"h":2}"#,
        r#"{"fr":30,"ip":0,"op":10000000000,"w":2,"h":2}"#,
        r#"{"fr":30,"ip":0,"op":10,"w":1e12,"h":2}"#,
        r#"{"fr":30,"ip":0,"op":10,"w":2,"h":4294967295}"#,
    ] {
        let err = AnimationDescriptor::from_json_str(json).unwrap_err();
        assert!(matches!(err, ReelError::InvalidAnimation(_)), "{json}: {err}");
    }

    let d = AnimationDescriptor::from_json_str(r#"{"fr":30,"ip":0,"op":10,"w":2,"h":2}"#)
        .unwrap();
    assert!(matches!(
        d.output_canvas(Some(u32::MAX), None),
        Err(ReelError::Validation(_))
    ));
}
