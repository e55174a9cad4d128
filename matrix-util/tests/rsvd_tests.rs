use matrix_util::traits::{RandomizedAlgs, SampleOps};
use nalgebra::DMatrix;

#[test]
fn dmatrix_rsvd_recovers_low_rank() -> anyhow::Result<()> {
    let aa = DMatrix::<f32>::rnorm(40, 3, 1);
    let bb = DMatrix::<f32>::rnorm(3, 30, 2);
    let xx = &aa * &bb;

    let (uu, ss, vv) = xx.rsvd(3, 42)?;

    let recon = &uu * DMatrix::from_diagonal(&ss) * vv.transpose();
    let rel_err = (&recon - &xx).norm() / xx.norm();
    assert!(rel_err < 1e-3, "relative error {}", rel_err);

    let utu = uu.transpose() * &uu;
    let vtv = vv.transpose() * &vv;
    let eye = DMatrix::<f32>::identity(3, 3);
    assert!((utu - &eye).abs().max() < 1e-3);
    assert!((vtv - &eye).abs().max() < 1e-3);

    Ok(())
}

#[test]
fn dmatrix_rsvd_identity_rank_is_capped() -> anyhow::Result<()> {
    let xx = DMatrix::<f32>::identity(8, 5);
    let (uu, ss, vv) = xx.rsvd(20, 0)?;
    assert_eq!(ss.len(), 5);
    assert_eq!(uu.shape(), (8, 5));
    assert_eq!(vv.shape(), (5, 5));
    for s in ss.iter() {
        assert!((s - 1.0).abs() < 1e-4);
    }
    Ok(())
}

#[test]
fn dmatrix_rsvd_rejects_empty() {
    let xx = DMatrix::<f32>::zeros(0, 4);
    assert!(xx.rsvd(2, 0).is_err());
}
