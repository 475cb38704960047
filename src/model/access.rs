use crate::{
    model::{
        ModelManager,
        entity::{Course, Enrollment},
        error::{DatabaseError, DatabaseResult},
    },
    web::AuthenticatedUser,
};

#[async_trait::async_trait]
pub trait HasOwner {
    type OwnerId: PartialEq + Send + Sync;
    async fn get_owner_id(
        &self,
        mm: &ModelManager,
        ctx: &AuthenticatedUser,
    ) -> DatabaseResult<Self::OwnerId>;
}

pub async fn check_access<T: HasOwner<OwnerId = O>, O: PartialEq + Send + Sync>(
    mm: &ModelManager,
    ctx: &AuthenticatedUser,
    resource: &T,
    expected: O,
) -> DatabaseResult<()> {
    // admin can get all resources
    if ctx.is_admin() {
        return Ok(());
    }

    let actual_owner = resource.get_owner_id(mm, ctx).await?;
    if actual_owner == expected {
        Ok(())
    } else {
        Err(DatabaseError::Forbidden)
    }
}

/// What the actor may do inside a single course.
#[derive(Debug)]
pub struct CourseAccess {
    is_instructor: bool,
    enrollment: Option<Enrollment>,
}

impl CourseAccess {
    pub async fn resolve(
        mm: &ModelManager,
        actor: &AuthenticatedUser,
        course: &Course,
    ) -> DatabaseResult<Self> {
        let is_instructor = actor.is_admin() || course.instructor_id() == Some(actor.user_id());
        let enrollment = Enrollment::find_active(mm, actor.user_id(), course.id()).await?;
        Ok(Self {
            is_instructor,
            enrollment,
        })
    }

    /// Instructor of the course, or an admin.
    pub fn is_instructor(&self) -> bool {
        self.is_instructor
    }

    pub fn enrollment(&self) -> Option<&Enrollment> {
        self.enrollment.as_ref()
    }

    pub fn into_enrollment(self) -> Option<Enrollment> {
        self.enrollment
    }

    /// Enrolled learners and course staff may post, view and discuss.
    pub fn can_participate(&self) -> bool {
        self.is_instructor || self.enrollment.is_some()
    }
}
