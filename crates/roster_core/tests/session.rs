use roster_core::db::{open_db, open_db_in_memory};
use roster_core::{
    with_session, CrudRepository, Member, RepoError, RepoResult, Session, SqliteMemberRepository,
};
use std::rc::Rc;

#[test]
fn with_session_commits_on_ok() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("commit.db");
    let mut conn = open_db(&path).unwrap();

    let id = with_session(&mut conn, |session| {
        let members = SqliteMemberRepository::try_new(session)?;
        let member = members.save(Member::with_age("member1", 10))?;
        let id = member.borrow().id().unwrap();
        Ok(id)
    })
    .unwrap();
    drop(conn);

    let mut reopened = open_db(&path).unwrap();
    let session = Session::begin(&mut reopened).unwrap();
    let members = SqliteMemberRepository::try_new(&session).unwrap();
    let found = members.find_by_id(id).unwrap().unwrap();
    assert_eq!(found.borrow().username, "member1");
}

#[test]
fn with_session_rolls_back_on_err() {
    let mut conn = open_db_in_memory().unwrap();

    let result: RepoResult<()> = with_session(&mut conn, |session| {
        let members = SqliteMemberRepository::try_new(session)?;
        members.save(Member::new("member1"))?;
        members.save(Member::new(" "))?;
        Ok(())
    });
    assert!(matches!(result, Err(RepoError::Validation(_))));

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM member", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn dropping_session_without_commit_discards_changes() {
    let mut conn = open_db_in_memory().unwrap();
    {
        let session = Session::begin(&mut conn).unwrap();
        let members = SqliteMemberRepository::try_new(&session).unwrap();
        members.save(Member::new("member1")).unwrap();
    }

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM member", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn commit_flushes_pending_changes() {
    let mut conn = open_db_in_memory().unwrap();
    let session = Session::begin(&mut conn).unwrap();
    let member = {
        let members = SqliteMemberRepository::try_new(&session).unwrap();
        members.save(Member::with_age("member1", 10)).unwrap()
    };
    member.borrow_mut().age = 42;
    session.commit().unwrap();

    let age: i64 = conn
        .query_row("SELECT age FROM member WHERE username = 'member1'", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(age, 42);
}

#[test]
fn clear_and_detach_stop_tracking() {
    let mut conn = open_db_in_memory().unwrap();
    let session = Session::begin(&mut conn).unwrap();
    let members = SqliteMemberRepository::try_new(&session).unwrap();

    let member1 = members.save(Member::new("member1")).unwrap();
    let member2 = members.save(Member::new("member2")).unwrap();
    assert!(session.contains(&member1));
    assert_eq!(session.managed_count(), 2);

    session.detach(&member1).unwrap();
    assert!(!session.contains(&member1));
    assert!(session.contains(&member2));

    member1.borrow_mut().set_username("ignored");
    session.flush().unwrap();
    let id1 = member1.borrow().id().unwrap();
    let reloaded = members.find_by_id(id1).unwrap().unwrap();
    assert!(!Rc::ptr_eq(&member1, &reloaded));
    assert_eq!(reloaded.borrow().username, "member1");

    session.clear();
    assert_eq!(session.managed_count(), 0);
    assert!(!session.contains(&member2));
}

#[test]
fn borrowed_instance_is_reported_on_flush() {
    let mut conn = open_db_in_memory().unwrap();
    let session = Session::begin(&mut conn).unwrap();
    let members = SqliteMemberRepository::try_new(&session).unwrap();

    let member = members.save(Member::new("member1")).unwrap();
    let guard = member.borrow_mut();
    assert!(matches!(
        session.flush(),
        Err(RepoError::EntityBorrowed("Member"))
    ));
    drop(guard);
    assert_eq!(session.flush().unwrap(), 0);
}
