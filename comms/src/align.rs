/// Primitive number types that are 8 bytes aligned.
///
/// Receive buffers are made of these so any payload that starts at an 8 byte
/// offset can be reinterpreted as `f64` in place.
pub trait Align8: bytemuck::Pod {}

impl Align8 for u64 {}
impl Align8 for i64 {}
impl Align8 for u128 {}
impl Align8 for i128 {}
impl Align8 for f64 {}
