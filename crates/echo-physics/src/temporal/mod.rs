// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Motion over a single simulation step (swept bounds for CCD and body tests).

#[doc = "Start/end transform pair bounding one step of motion."]
pub mod timespan;
